//! Shared helpers for the award loader integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use awards_ingest::storage::ObjectSource;
use std::collections::{BTreeMap, BTreeSet};

/// A complete award file using every label, with a three-line sponsor block
pub const FULL_AWARD: &str = "\
Title       : Dynamics of Ceramic Grain Boundaries
Type        : Award
NSF Org     : DMR
Latest
Amendment
Date        : August 1,  1991
File        : a9000006

Award Number: 9000006
Award Instr.: Standard Grant
Prgm Manager: Liselotte J. Schioler
              DMR  DIVISION OF MATERIALS RESEARCH
              MPS  DIRECT FOR MATHEMATICAL & PHYSICAL SCIEN
Start Date  : June 1,  1990
Expires     : November 30,  1992   (Estimated)
Expected
Total Amt.  : $140,000            (Estimated)
Investigator: Jane Doe  (Principal Investigator current)
              John Roe  (Co-Principal Investigator current)
Sponsor     : U of Washington
              4333 Brooklyn Ave NE
              Seattle, WA  98195    206/543-4043

NSF Program : 1711      CERAMICS
Fld Applictn: 0106000   Materials Research
Program Ref : 9161,9216,AMPP,
Abstract    :
              9000006 Grain boundaries in ceramics control many of
              their useful properties.  This project studies them.
              ----------------------------------------------------
";

/// Award text for `number` with a given investigator role and amount text
pub fn award_text(number: &str, role: &str, amount: &str) -> String {
    format!(
        "\
Title       : Award {number}
Type        : Award
NSF Org     : CHE
Latest
Amendment
Date        : May 3,  1990
File        : a{number}

Award Number: {number}
Award Instr.: Standard Grant
Prgm Manager: Ann Smith
Start Date  : June 1,  1990
Expires     : May 31,  1993   (Estimated)
Expected
Total Amt.  : {amount}           (Estimated)
Investigator: Jane Doe  ({role})
Sponsor     : MIT
              77 Massachusetts Ave
              Cambridge, MA  02139
              617/253-1000

NSF Program : 1711      CERAMICS
Fld Applictn: 0106000   Materials Research
Program Ref : 9161,
Abstract    :
              {number} Work on award {number}.
"
    )
}

/// In-memory object source with optional per-key fetch failures
#[derive(Debug, Default)]
pub struct MemorySource {
    objects: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
    panicking: BTreeSet<String>,
    fail_listing: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(key.to_string(), body.into());
        self
    }

    /// Listed, but every fetch fails
    pub fn with_broken(mut self, key: &str) -> Self {
        self.objects.insert(key.to_string(), Vec::new());
        self.failing.insert(key.to_string());
        self
    }

    /// Listed, and fetching it panics the calling task
    pub fn with_panicking(mut self, key: &str) -> Self {
        self.objects.insert(key.to_string(), Vec::new());
        self.panicking.insert(key.to_string());
        self
    }

    pub fn with_listing_failure(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

#[async_trait]
impl ObjectSource for MemorySource {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        if self.fail_listing {
            return Err(anyhow!("access denied"));
        }
        Ok(self
            .objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        if self.panicking.contains(key) {
            panic!("simulated fetch panic for {key}");
        }
        if self.failing.contains(key) {
            return Err(anyhow!("connection reset"));
        }
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no such key: {key}"))
    }
}

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,awards_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}
