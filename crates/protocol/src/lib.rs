// syncline-protocol: wire formats and presence state for the sync provider

pub mod awareness;
pub mod types;
pub mod wire;
