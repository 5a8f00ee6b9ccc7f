pub mod business;
pub mod calendar;
pub mod conversation;
