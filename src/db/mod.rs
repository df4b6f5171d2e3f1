pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{
    AccessFlags, AccessToken, CommodityType, CurrentUser, Floor, Meter, NewReading, Profile,
    ReadingFilter, ReadingPage, ReadingRecord, ReadingSample, Role, SignInMethod,
};
