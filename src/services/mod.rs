pub(crate) mod attempt_flow;
pub(crate) mod events;
pub(crate) mod gating;
pub(crate) mod grading;
pub(crate) mod student_stats;
