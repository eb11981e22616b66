pub mod app;
pub mod channel;
pub mod engine;
pub mod events;
pub mod frame_clock;
pub mod gateway;
pub mod osc;
pub mod status;
