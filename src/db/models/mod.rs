pub mod meter;
pub mod reading;
pub mod user;

pub use meter::{CommodityType, Floor, Meter};
pub use reading::{NewReading, ReadingFilter, ReadingPage, ReadingRecord, ReadingSample};
pub use user::{AccessFlags, AccessToken, CurrentUser, Profile, Role, SignInMethod};
