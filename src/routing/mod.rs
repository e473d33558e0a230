// Purpose: Channel routing between a processor's inputs and outputs
// A matrix maps every source channel to at most one destination, plus one send

pub mod matrix;
pub mod preset;
pub mod route_fx;

pub use matrix::{ChannelPair, MatrixData, MatrixListener, Notify, RoutingMatrix, Table, ROUTING_RECORD};
pub use preset::RoutingPreset;
pub use route_fx::RouteEffect;
