pub mod site;
pub mod views;

pub use site::TestSite;
pub use views::MockViews;
