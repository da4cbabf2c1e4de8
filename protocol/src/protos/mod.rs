// Generated by build.rs from light.proto.
include!(concat!(env!("OUT_DIR"), "/generated/mod.rs"));
