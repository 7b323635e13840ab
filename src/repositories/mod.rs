pub(crate) mod attempts;
pub(crate) mod exams;
pub(crate) mod notifications;
pub(crate) mod questions;
pub(crate) mod sessions;
pub(crate) mod student_stats;
pub(crate) mod users;
pub(crate) mod videos;
