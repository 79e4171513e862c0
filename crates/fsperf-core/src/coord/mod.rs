//! Cross-process rendezvous over a rank/size model.
//!
//! Cooperating processes exchange newline-delimited JSON through an external
//! relay that copies every line to every rank. A barrier is one empty line
//! from each rank; a broadcast is one `{"rank":r,"payload":...}` line from
//! each rank, collected back in rank order. There is no timeout: a peer that
//! never writes blocks the others indefinitely.

mod transport;

pub use transport::{
    LoopbackTransport, MemoryTransport, PipeTransport, Transport, memory_hub, stream_path,
};

use crate::error::{BenchError, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variables consulted for (rank, size), in order.
pub const RANK_SIZE_VARS: &[(&str, &str)] = &[
    ("FSPERF_RANK", "FSPERF_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
];

pub const COORD_IN_VAR: &str = "FSPERF_COORD_IN";
pub const COORD_OUT_VAR: &str = "FSPERF_COORD_OUT";

#[derive(Serialize)]
struct Outgoing<'a, T> {
    rank: usize,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Incoming<T> {
    rank: usize,
    payload: T,
}

/// This process's handle on the distributed rendezvous.
///
/// All stream access goes through one lock; in practice only the leader
/// of each local barrier round ever takes it.
pub struct HostCoordinator {
    rank: usize,
    size: usize,
    transport: Mutex<Box<dyn Transport>>,
}

impl std::fmt::Debug for HostCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCoordinator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl HostCoordinator {
    pub fn new(rank: usize, size: usize, transport: Box<dyn Transport>) -> Result<Self> {
        if size == 0 || rank >= size {
            return Err(BenchError::invalid(format!(
                "rank {rank} is outside a world of size {size}"
            )));
        }
        Ok(Self {
            rank,
            size,
            transport: Mutex::new(transport),
        })
    }

    /// A world of one process.
    pub fn single() -> Self {
        Self {
            rank: 0,
            size: 1,
            transport: Mutex::new(Box::new(LoopbackTransport::default())),
        }
    }

    /// Build the coordinator from launcher-provided environment.
    ///
    /// Explicit stream names win over `FSPERF_COORD_IN`/`FSPERF_COORD_OUT`.
    /// Without a rank/size pair the process runs alone.
    pub fn from_env(coord_in: Option<&str>, coord_out: Option<&str>) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), coord_in, coord_out)
    }

    /// [`HostCoordinator::from_env`] over an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        coord_in: Option<&str>,
        coord_out: Option<&str>,
    ) -> Result<Self> {
        let Some((rank, size)) = discover_rank_size(&lookup)? else {
            return Ok(Self::single());
        };
        if size == 1 {
            return Ok(Self::single());
        }

        let inbound = coord_in.map(str::to_string).or_else(|| lookup(COORD_IN_VAR));
        let outbound = coord_out.map(str::to_string).or_else(|| lookup(COORD_OUT_VAR));
        let (Some(inbound), Some(outbound)) = (inbound, outbound) else {
            return Err(BenchError::invalid(format!(
                "rank {rank} of {size} needs {COORD_IN_VAR} and {COORD_OUT_VAR}"
            )));
        };

        debug!(rank, size, %inbound, %outbound, "Opening coordination streams");
        let transport = PipeTransport::open(&inbound, &outbound).map_err(BenchError::Coordination)?;
        Self::new(rank, size, Box::new(transport))
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Block until every rank has reached the barrier.
    pub fn barrier(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.send_line("").map_err(BenchError::Coordination)?;
        for _ in 0..self.size {
            let line = transport.recv_line().map_err(BenchError::Coordination)?;
            if !line.trim().is_empty() {
                return Err(BenchError::Protocol(format!(
                    "expected a barrier line, got {line:?}"
                )));
            }
        }
        Ok(())
    }

    /// Publish `value` to every rank.
    pub fn broadcast<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut transport = self.transport.lock();
        self.send(transport.as_mut(), value)
    }

    /// Collect one value from every rank, ordered by rank.
    pub fn receive_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut transport = self.transport.lock();
        self.collect(transport.as_mut())
    }

    /// Broadcast `value` and collect everyone's, holding the streams throughout.
    pub fn exchange<T: Serialize + DeserializeOwned>(&self, value: &T) -> Result<Vec<T>> {
        let mut transport = self.transport.lock();
        self.send(transport.as_mut(), value)?;
        self.collect(transport.as_mut())
    }

    /// Check that every rank is about to run the same TestCase.
    pub fn verify_testcase(&self, id: u64) -> Result<()> {
        let ids: Vec<u64> = self.exchange(&id)?;
        match ids.iter().enumerate().find(|&(_, &remote)| remote != id) {
            Some((rank, &remote)) => Err(BenchError::ConfigurationMismatch {
                rank,
                local: id,
                remote,
            }),
            None => Ok(()),
        }
    }

    fn send<T: Serialize>(&self, transport: &mut dyn Transport, value: &T) -> Result<()> {
        let line = serde_json::to_string(&Outgoing {
            rank: self.rank,
            payload: value,
        })?;
        transport.send_line(&line).map_err(BenchError::Coordination)
    }

    fn collect<T: DeserializeOwned>(&self, transport: &mut dyn Transport) -> Result<Vec<T>> {
        let mut slots: Vec<Option<T>> = (0..self.size).map(|_| None).collect();
        for _ in 0..self.size {
            let line = transport.recv_line().map_err(BenchError::Coordination)?;
            let incoming: Incoming<T> = serde_json::from_str(&line)?;
            let slot = slots.get_mut(incoming.rank).ok_or_else(|| {
                BenchError::Protocol(format!("message from unknown rank {}", incoming.rank))
            })?;
            if slot.replace(incoming.payload).is_some() {
                return Err(BenchError::Protocol(format!(
                    "rank {} sent twice in one round",
                    incoming.rank
                )));
            }
        }
        // Exactly `size` distinct ranks were filled.
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Find this process's (rank, size) among the launcher variables.
///
/// Returns `None` when no pair is set at all.
pub fn discover_rank_size(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<(usize, usize)>> {
    for &(rank_var, size_var) in RANK_SIZE_VARS {
        let (Some(rank), Some(size)) = (lookup(rank_var), lookup(size_var)) else {
            continue;
        };
        let parse = |var: &str, value: &str| {
            value.trim().parse::<usize>().map_err(|_| {
                BenchError::invalid(format!("{var}={value} is not a non-negative integer"))
            })
        };
        let rank = parse(rank_var, &rank)?;
        let size = parse(size_var, &size)?;
        if size == 0 || rank >= size {
            return Err(BenchError::invalid(format!(
                "{rank_var}={rank} is outside {size_var}={size}"
            )));
        }
        return Ok(Some((rank, size)));
    }
    Ok(None)
}
