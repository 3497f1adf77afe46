pub mod classification;
pub mod events;
pub mod extraction;
pub mod naming;
pub mod processor;
pub mod relocate;
