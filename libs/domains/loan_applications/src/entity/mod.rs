pub mod loan_application;
pub mod tenant;
