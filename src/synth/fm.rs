//! FM carrier/modulator configuration and its validity check.

/*
FM Inside a Group
=================

Two children of a group can be paired: the MODULATOR is rendered first and
its output bends the pitch of the CARRIER, which is the only one heard.

    fm[i]    = 1 + modulator[i] × modulator_gain × modulator_chain_gain[i]
    pitch[i] = carrier_pitch[i] × group_pitch[i] × detune × fm[i]

The +1 turns the bipolar modulator signal into a ratio around 1.0. The
product is clipped to [1e-8, 1000] so a loud modulator cannot drive the
carrier to a zero or negative frequency.


Validity
--------

The pairing is described by three values: enabled, carrier index and
modulator index (child positions, `None` = unset). They are checked on
every change and on every add/remove of a child:

    enabled?  carrier valid?  modulator valid?  same?    state
    ────────  ──────────────  ────────────────  ───────  ──────────────────────
    no        yes             -                 -        Soloed (carrier only)
    no        no              -                 -        Deactivated
    yes       no              -                 -        InvalidCarrier
    yes       yes             no                -        InvalidModulator
    yes       yes             yes               yes      CarrierEqualsModulator
    yes       yes             yes               no       Working

Only Working renders FM. A valid carrier is honoured in every other state
too: voices then play that child alone, without FM.
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::synth::child::{ChildList, SynthId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FmState {
    /// Initial state, before the first check
    Disabled,
    /// FM is off and no carrier is set
    Deactivated,
    /// FM is off, the carrier plays alone
    Soloed,
    InvalidCarrier,
    InvalidModulator,
    CarrierEqualsModulator,
    Working,
}

/// State plus a message for editors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmStatus {
    pub state: FmState,
    pub message: String,
}

impl FmStatus {
    pub fn new(state: FmState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn is_working(&self) -> bool {
        self.state == FmState::Working
    }
}

impl Default for FmStatus {
    fn default() -> Self {
        Self::new(FmState::Disabled, "FM disabled")
    }
}

impl fmt::Display for FmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FmConfig {
    pub enabled: bool,
    pub carrier_index: Option<usize>,
    pub modulator_index: Option<usize>,
}

impl FmConfig {
    pub fn evaluate(&self, children: &ChildList) -> FmStatus {
        let carrier = self.carrier_index.and_then(|i| children.get(i));
        let modulator_valid = self.modulator_index.is_some_and(|i| i < children.len());

        if !self.enabled {
            return match carrier {
                Some(synth) => FmStatus::new(FmState::Soloed, format!("{} is soloed (no FM)", synth.name())),
                None => FmStatus::new(FmState::Deactivated, "FM is deactivated"),
            };
        }

        if carrier.is_none() {
            FmStatus::new(FmState::InvalidCarrier, "The carrier synth is not valid")
        } else if !modulator_valid {
            FmStatus::new(FmState::InvalidModulator, "The modulator synth is not valid")
        } else if self.carrier_index == self.modulator_index {
            FmStatus::new(
                FmState::CarrierEqualsModulator,
                "Carrier and modulator must be different synths",
            )
        } else {
            FmStatus::new(FmState::Working, "FM is working")
        }
    }
}

/// Resolved pairing used by the render path.
///
/// `carrier` is set whenever the carrier index points at a child, FM or not
/// (that is what makes it a solo). `modulator` is only set while FM works.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FmRouting {
    pub correctly_setup: bool,
    pub carrier: Option<(usize, SynthId)>,
    pub modulator: Option<(usize, SynthId)>,
}

impl FmRouting {
    pub fn resolve(config: &FmConfig, children: &ChildList, status: &FmStatus) -> Self {
        let lookup = |index: Option<usize>| index.and_then(|i| children.id_at(i).map(|id| (i, id)));
        let correctly_setup = status.is_working();

        Self {
            correctly_setup,
            carrier: lookup(config.carrier_index),
            modulator: if correctly_setup {
                lookup(config.modulator_index)
            } else {
                None
            },
        }
    }

    pub fn carrier_index(&self) -> Option<usize> {
        self.carrier.map(|(index, _)| index)
    }

    pub fn carrier_id(&self) -> Option<SynthId> {
        self.carrier.map(|(_, id)| id)
    }

    pub fn modulator_index(&self) -> Option<usize> {
        self.modulator.map(|(index, _)| index)
    }

    pub fn modulator_id(&self) -> Option<SynthId> {
        self.modulator.map(|(_, id)| id)
    }

    /// Carrier index for carrier-only iteration: only while FM works.
    pub fn fm_carrier_index(&self) -> Option<usize> {
        if self.correctly_setup {
            self.carrier_index()
        } else {
            None
        }
    }
}
