mod capability;
mod compression;
mod key_id;
mod mpi;
mod packet;
mod s2k;

pub use self::{
    capability::{Capability, KeyFlags},
    compression::CompressionAlgorithm,
    key_id::{Fingerprint, KeyId},
    mpi::Mpi,
    packet::*,
    s2k::{StringToKey, StringToKeyType, DEFAULT_ITER_COUNT},
};
