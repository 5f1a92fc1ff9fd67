mod course;
mod permission;
mod rating;
mod role;
mod session;
mod token;
mod user;

pub use course::{
    Course, CoursePosting, CreateCoursePostingRequest, CreateCourseRequest,
    UpdateCoursePostingRequest, UpdateCourseRequest,
};
pub use permission::{Permission, Permissions, UnknownPermission};
pub use rating::{CreateRatingRequest, FacilitatorRating};
pub use role::{
    AssignRoleRequest, ChangeRoleRequest, RevokeRoleRequest, Role, RoleRequest, UserRole,
    UserWithRoles,
};
pub use session::{
    Attendance, CreateAttendanceRequest, CreateSessionRequest, CreateUserSessionRequest, Session,
    UpdateAttendanceRequest, UpdateSessionRequest, UpdateUserSessionRequest, UserSession,
};
pub use token::{Scope, Token, TokenHash};
pub use user::{
    ActivateUserRequest, CreateTokenRequest, RegisterUserRequest, UpdatePasswordRequest,
    UpdateUserRequest, User, hash_password, verify_dummy_password, verify_password,
};
