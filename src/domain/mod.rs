pub mod comment;
pub mod group;
pub mod post;
pub mod report;
pub mod student;
pub mod vote;
