mod courses;
mod health;
mod ratings;
mod roles;
mod sessions;
mod users;
pub mod util;

pub use courses::{
    create_course, create_course_posting, delete_course, delete_course_posting, list_course_postings,
    list_courses, show_course, show_course_posting, update_course, update_course_posting,
};
pub use health::{healthcheck, metrics};
pub use ratings::{create_rating, list_ratings, show_rating};
pub use roles::{
    assign_role, change_user_role, create_role, delete_role, list_roles, list_users_with_roles,
    revoke_user_role, show_role, update_role, user_roles,
};
pub use sessions::{
    create_attendance, create_session, create_user_session, delete_session, delete_user_session,
    list_sessions, list_user_sessions, show_attendance, show_session, show_user_session,
    update_attendance, update_session, update_user_session,
};
pub use users::{
    activate_user, create_authentication_token, delete_user, list_users, register_user,
    update_password, update_user,
};
