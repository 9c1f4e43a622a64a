//! Host authority and client replica modules

pub mod bot;
pub mod broadcast;
pub mod catalog;
pub mod combat;
pub mod host;
pub mod interpolation;
pub mod loot;
pub mod physics;
pub mod replica;
pub mod state;
pub mod validator;
pub mod zone;

pub use catalog::Catalog;
pub use host::HostRuntime;
pub use interpolation::{Interpolator, PositionSample, RenderState};
pub use replica::ReplicaView;
pub use state::{MatchPhase, MatchState, PlayerRecord};
