//! TestCase planning.
//!
//! A [`TestCase`] pins one point of the parameter space together with the
//! ordered operation list every worker executes for it. Its `id` is a weak
//! additive checksum used only to confirm that cooperating processes built
//! the same plan; it is not a durable identity and is never reused across
//! runs.

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::ops::OpKind;
use crate::workload::Namespace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Family of a TestCase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Meta,
    Io,
}

/// Parameters of one TestCase.
///
/// Metadata cases carry `opcnt` and `factor`; I/O cases carry `fsize` and
/// `blksize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestEnv {
    pub optype: OpType,
    pub nproc: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub opcnt: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub factor: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fsize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub blksize: Option<u64>,
}

impl TestEnv {
    pub fn meta(nproc: usize, opcnt: usize, factor: usize) -> Self {
        Self {
            optype: OpType::Meta,
            nproc,
            opcnt: Some(opcnt),
            factor: Some(factor),
            fsize: None,
            blksize: None,
        }
    }

    pub fn io(nproc: usize, fsize: u64, blksize: u64) -> Self {
        Self {
            optype: OpType::Io,
            nproc,
            opcnt: None,
            factor: None,
            fsize: Some(fsize),
            blksize: Some(blksize),
        }
    }

    /// Parameter tuple that keys aggregate records.
    pub fn key(&self) -> String {
        match self.optype {
            OpType::Meta => format!(
                "opcnt={},factor={}",
                self.opcnt.unwrap_or(0),
                self.factor.unwrap_or(0)
            ),
            OpType::Io => format!(
                "fsize={},blksize={}",
                self.fsize.unwrap_or(0),
                self.blksize.unwrap_or(0)
            ),
        }
    }
}

impl fmt::Display for TestEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.optype {
            OpType::Meta => "meta",
            OpType::Io => "io",
        };
        write!(f, "{kind} nproc={} {}", self.nproc, self.key())
    }
}

/// One immutable unit of the benchmark plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub env: TestEnv,
    pub ops: Vec<OpKind>,
}

impl TestCase {
    /// Build a TestCase, rejecting operation lists that cannot run in order.
    pub fn new(env: TestEnv, ops: Vec<OpKind>) -> Result<Self> {
        validate_ops(&env, &ops)?;
        let serialized = serde_json::to_string(&(&env, &ops))?;
        Ok(Self {
            id: checksum(&serialized),
            env,
            ops,
        })
    }
}

/// `Σ ord(c_i) * (i + 1)` over the characters of `text`.
pub fn checksum(text: &str) -> u64 {
    text.chars()
        .zip(1u64..)
        .fold(0u64, |acc, (c, weight)| {
            acc.wrapping_add(u64::from(c).wrapping_mul(weight))
        })
}

fn validate_ops(env: &TestEnv, ops: &[OpKind]) -> Result<()> {
    if ops.is_empty() {
        return Err(BenchError::invalid(format!("{env}: empty operation list")));
    }

    match env.optype {
        OpType::Meta => {
            let mut namespace = Namespace::default();
            for &op in ops {
                if !op.is_meta() {
                    return Err(BenchError::invalid(format!("{op} in a metadata TestCase")));
                }
                namespace.apply(op)?;
            }
        }
        OpType::Io => {
            let mut written = false;
            for &op in ops {
                if op.is_meta() {
                    return Err(BenchError::invalid(format!("{op} in an I/O TestCase")));
                }
                if op.is_reader() && !written {
                    return Err(BenchError::invalid(format!(
                        "{op} needs an earlier write operation"
                    )));
                }
                written |= op.is_writer();
            }
        }
    }

    Ok(())
}

/// Expand the configuration ranges into the ordered TestCase plan.
pub fn build_plan(config: &BenchConfig) -> Result<Vec<TestCase>> {
    let mut plan = Vec::new();

    if config.mode.includes_meta() {
        for &opcnt in &config.opcnt_range {
            for &factor in &config.factor_range {
                let env = TestEnv::meta(config.nproc, opcnt, factor);
                plan.push(TestCase::new(env, config.meta_ops.clone())?);
            }
        }
    }

    if config.mode.includes_io() {
        for &fsize in &config.fsize_range {
            for &blksize in &config.blksize_range {
                if blksize > fsize {
                    tracing::debug!("Skipping blksize {} larger than fsize {}", blksize, fsize);
                    continue;
                }
                let env = TestEnv::io(config.nproc, fsize, blksize);
                plan.push(TestCase::new(env, config.io_ops.clone())?);
            }
        }
    }

    if plan.is_empty() {
        return Err(BenchError::invalid("configuration produces no TestCases"));
    }
    Ok(plan)
}
