//! Dialogue scenarios

pub mod expenses_test;
pub mod invitation_test;
pub mod mood_test;
pub mod registration_journey_test;
