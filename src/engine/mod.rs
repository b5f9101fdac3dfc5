pub mod dispatch;
pub mod earnings;
pub mod guard;
pub mod intake;
pub mod queue;
pub mod transition;
pub mod worker;
