pub mod agent;
pub mod assignment;
pub mod earnings;
pub mod order;
pub mod restaurant;
