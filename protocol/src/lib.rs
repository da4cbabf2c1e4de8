pub mod fragment_combiner;
pub mod light;
pub mod protos;
