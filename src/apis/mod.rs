//! IPED API access: request validation, the shared client, and one service per
//! resource (users, trails, courses).

pub mod courses;
pub mod iped;
pub mod trails;
pub mod users;
pub mod validate;

pub use courses::CourseService;
pub use iped::IpedClient;
pub use trails::TrailService;
pub use users::UserService;
