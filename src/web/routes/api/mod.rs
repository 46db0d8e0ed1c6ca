pub mod subscribe;
pub mod users;

pub use subscribe::subscribe;
pub use users::users;
