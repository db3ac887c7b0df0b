// Business operations. Each function works on a `Database` borrowed from the
// `Store`; mutating functions take the acting user and the current time.

pub mod access;
pub mod accounts;
pub mod analytics;
pub mod assistant;
pub mod audit;
pub mod automation;
pub mod credit;
pub mod education;
pub mod finance;
pub mod gamification;
pub mod governance;
pub mod groups;
pub mod investments;
pub mod kyc;
pub mod payments;
pub mod reports;
pub mod store;
pub mod sync;
pub mod wealth;

pub use store::Store;
