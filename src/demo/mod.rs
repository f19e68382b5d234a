// Sample collaborators for the CLI; not part of the workflow core

pub mod sales;

pub use sales::SalesOrderService;
