use std::collections::HashMap;
use std::fmt;

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, Preset> = {
        let mut m = HashMap::new();
        for p in Preset::ALL.iter() {
            m.insert(p.name(), *p);
            m.insert(p.alias(), *p);
        }
        m
    };
}

/// A portable hardware event.
///
/// Each preset has a PAPI-style name (`PAPI_L1_DCM`) and a `perf`-style alias
/// (`L1-dcache-load-misses`); both resolve to the same event. Back-ends map a
/// preset onto whatever their native counter interface calls it, and may not
/// support every preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Retired instructions.
    TotalInstructions,
    /// CPU cycles.
    TotalCycles,
    /// Retired branch instructions.
    BranchInstructions,
    /// Mispredicted branches.
    BranchMispredictions,
    /// L1 data cache read accesses.
    L1DataAccesses,
    /// L1 data cache read misses.
    L1DataMisses,
    /// Last-level cache accesses.
    LastLevelAccesses,
    /// Last-level cache misses.
    LastLevelMisses,
    /// Data TLB misses.
    DataTlbMisses,
}

impl Preset {
    /// Every preset, in handle order.
    pub const ALL: [Preset; 9] = [
        Preset::TotalInstructions,
        Preset::TotalCycles,
        Preset::BranchInstructions,
        Preset::BranchMispredictions,
        Preset::L1DataAccesses,
        Preset::L1DataMisses,
        Preset::LastLevelAccesses,
        Preset::LastLevelMisses,
        Preset::DataTlbMisses,
    ];

    /// Look up a preset by its PAPI name or `perf` alias.
    pub fn from_name(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }

    pub(crate) fn from_index(idx: u32) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }

    pub(crate) fn index(self) -> u32 {
        self as u32
    }

    /// The PAPI-style name.
    pub fn name(self) -> &'static str {
        match self {
            Preset::TotalInstructions => "PAPI_TOT_INS",
            Preset::TotalCycles => "PAPI_TOT_CYC",
            Preset::BranchInstructions => "PAPI_BR_INS",
            Preset::BranchMispredictions => "PAPI_BR_MSP",
            Preset::L1DataAccesses => "PAPI_L1_DCA",
            Preset::L1DataMisses => "PAPI_L1_DCM",
            Preset::LastLevelAccesses => "PAPI_L3_TCA",
            Preset::LastLevelMisses => "PAPI_L3_TCM",
            Preset::DataTlbMisses => "PAPI_TLB_DM",
        }
    }

    /// The `perf list` spelling of the same event.
    pub fn alias(self) -> &'static str {
        match self {
            Preset::TotalInstructions => "instructions",
            Preset::TotalCycles => "cycles",
            Preset::BranchInstructions => "branches",
            Preset::BranchMispredictions => "branch-misses",
            Preset::L1DataAccesses => "L1-dcache-loads",
            Preset::L1DataMisses => "L1-dcache-load-misses",
            Preset::LastLevelAccesses => "cache-references",
            Preset::LastLevelMisses => "cache-misses",
            Preset::DataTlbMisses => "dTLB-load-misses",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
