//! Reset and halt sequences.
//!
//! Each target family gets one [`ResetSequence`]. The family specific part
//! is usually limited to entering [`TargetState::ProgramMode`]; every other
//! state is handled by the generic software reset routine of the probe.

use std::fmt::Debug;
use std::sync::Arc;

use crate::architecture::arm::debug_mailbox::{DebugMailbox, DebugMailboxOutcome};
use crate::architecture::arm::registers::{Abort, Dhcsr, DpRegister, MemoryMappedRegister};
use crate::architecture::arm::ArmError;
use crate::config::{HaltConfig, Settings};
use crate::probe::{Cancellation, DebugTransport};

/// The states a target can be put into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, docsplay::Display)]
pub enum TargetState {
    /// reset held
    ResetHold,
    /// halted for programming
    ProgramMode,
    /// reset and running
    ResetRun,
    /// running without debug
    NoDebug,
    /// debug enabled
    Debug,
    /// halted
    Halt,
    /// running
    Run,
    /// reset after programming
    PostProgramReset,
    /// powered on
    PowerOn,
    /// shut down
    Shutdown,
    /// attached
    Attach,
}

/// A strategy bringing a target family into a requested state.
///
/// Sequences are stateless; the transport is borrowed for the duration of a
/// single call, and callers make sure no other sequence uses it meanwhile.
pub trait ResetSequence: Send + Sync + Debug {
    /// Brings the target into `state`.
    ///
    /// There is no partial success: an error leaves the target in an
    /// undefined state, and retrying is up to the caller.
    fn set_target_state(
        &self,
        probe: &mut dyn DebugTransport,
        state: TargetState,
        cancel: &Cancellation,
    ) -> Result<(), ArmError>;

    /// Like [`ResetSequence::set_target_state`], but only reports whether the
    /// target reached `state`. The error is logged.
    fn enter_state(
        &self,
        probe: &mut dyn DebugTransport,
        state: TargetState,
        cancel: &Cancellation,
    ) -> bool {
        match self.set_target_state(probe, state, cancel) {
            Ok(()) => {
                tracing::info!("Target is {state}");
                true
            }
            Err(error) => {
                tracing::warn!("Target could not be brought into state '{state}': {error}");
                false
            }
        }
    }
}

/// Halts the core so that a flash algorithm can be loaded.
///
/// 1. Initialize the debug port.
/// 2. Enable debug, pulsing reset between failed attempts.
/// 3. Run the debug mailbox handshake, if the family has one.
/// 4. Clear a stale access port transaction (best effort).
/// 5. Request a halt and wait until DHCSR reports it.
///
/// A halt observed on the last permitted DHCSR read counts as success.
#[tracing::instrument(skip_all)]
pub fn halt_for_programming(
    probe: &mut dyn DebugTransport,
    config: &HaltConfig,
    mailbox: Option<&DebugMailbox>,
    cancel: &Cancellation,
) -> Result<(), ArmError> {
    if let Err(error) = probe.init_debug() {
        tracing::warn!("Initializing the debug port failed: {error}");
        return Err(error.into());
    }

    enable_debug(probe, config)?;

    if let Some(mailbox) = mailbox {
        let result = mailbox.start_debug_session(probe, cancel);
        tracing::debug!("Debug mailbox: {}", DebugMailboxOutcome::from(&result));
        result?;
    }

    if let Err(error) = probe.write_dp_register(Abort::ADDRESS, Abort::dap_abort().into()) {
        tracing::debug!("Writing {} failed, continuing: {error}", Abort::NAME);
    }

    if let Err(error) = probe.write_word_32(Dhcsr::ADDRESS, Dhcsr::halt_request().into()) {
        tracing::warn!("Requesting a halt failed: {error}");
        return Err(error.into());
    }

    wait_for_halt(probe, config.poll_limit, cancel)
}

/// Writes `DBGKEY | C_DEBUGEN`. A target stuck in an invalid state sometimes
/// only accepts the write after a reset.
fn enable_debug(probe: &mut dyn DebugTransport, config: &HaltConfig) -> Result<(), ArmError> {
    let mut attempt = 1;

    loop {
        let error = match probe.write_word_32(Dhcsr::ADDRESS, Dhcsr::debug_enable().into()) {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };

        if attempt >= config.enable_debug_attempts {
            tracing::warn!("Failed to enable debug after {attempt} attempts: {error}");
            return Err(error.into());
        }

        tracing::debug!("Enabling debug failed ({error}), pulsing reset");

        probe.set_target_reset(true)?;
        probe.delay(config.reset_pulse);
        probe.set_target_reset(false)?;
        probe.delay(config.reset_pulse);

        attempt += 1;
    }
}

fn wait_for_halt(
    probe: &mut dyn DebugTransport,
    poll_limit: u32,
    cancel: &Cancellation,
) -> Result<(), ArmError> {
    let mut dhcsr = Dhcsr::from(0);

    for _ in 0..poll_limit {
        cancel.check()?;

        dhcsr = Dhcsr::from(probe.read_word_32(Dhcsr::ADDRESS)?);

        if dhcsr.s_halt() {
            tracing::debug!("Core halted");
            return Ok(());
        }
    }

    tracing::error!(
        "Failed to halt, {} = {:#010x} (lockup: {})",
        Dhcsr::NAME,
        u32::from(dhcsr),
        dhcsr.s_lockup()
    );

    Err(ArmError::RetryExhausted {
        register: Dhcsr::NAME,
        attempts: poll_limit,
        last_value: dhcsr.into(),
    })
}

/// The sequence of families without any special requirements.
///
/// Program mode is entered with [`halt_for_programming`] without a debug
/// mailbox, everything else is left to the probe.
#[derive(Debug)]
pub struct DefaultResetSequence {
    halt: HaltConfig,
}

impl DefaultResetSequence {
    /// Creates a new default sequence.
    pub fn create(settings: &Settings) -> Arc<dyn ResetSequence> {
        Arc::new(Self {
            halt: settings.halt,
        })
    }
}

impl ResetSequence for DefaultResetSequence {
    fn set_target_state(
        &self,
        probe: &mut dyn DebugTransport,
        state: TargetState,
        cancel: &Cancellation,
    ) -> Result<(), ArmError> {
        match state {
            TargetState::ProgramMode => halt_for_programming(probe, &self.halt, None, cancel),
            state => Ok(probe.set_target_state_sw(state)?),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MailboxConfig;
    use crate::probe::fake_probe::{FakeProbe, Operation};
    use crate::probe::TransportError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const DHCSR: u64 = Dhcsr::ADDRESS;
    const S_HALT: u32 = 1 << 17;

    fn config(poll_limit: u32) -> HaltConfig {
        HaltConfig {
            poll_limit,
            ..Default::default()
        }
    }

    fn dhcsr_reads(probe: &FakeProbe) -> usize {
        probe.count(|op| *op == Operation::ReadWord { address: DHCSR })
    }

    #[test]
    fn enable_debug_fails_twice() {
        let mut probe = FakeProbe::new();
        probe.fail_word_writes(DHCSR, 2, TransportError::NoAcknowledge);

        let sequence = DefaultResetSequence::create(&Settings::default());
        let halted = sequence.enter_state(&mut probe, TargetState::ProgramMode, &Cancellation::new());

        assert!(!halted);
        assert_eq!(
            probe.operations(),
            &[
                Operation::InitDebug,
                Operation::WriteWord { address: DHCSR, value: 0xa05f_0001 },
                Operation::SetReset(true),
                Operation::Delay(Duration::from_millis(2)),
                Operation::SetReset(false),
                Operation::Delay(Duration::from_millis(2)),
                Operation::WriteWord { address: DHCSR, value: 0xa05f_0001 },
            ]
        );
    }

    #[test]
    fn enable_debug_recovers_after_reset() {
        let mut probe = FakeProbe::new();
        probe.fail_word_writes(DHCSR, 1, TransportError::FaultResponse);

        let result = halt_for_programming(&mut probe, &config(10), None, &Cancellation::new());

        assert!(result.is_ok());
        assert_eq!(probe.count(|op| *op == Operation::SetReset(true)), 1);
        assert!(probe.is_halted());
    }

    #[test]
    fn stops_polling_once_halted() {
        let mut probe = FakeProbe::new();
        probe.script_word_reads(DHCSR, [0, 0x0001_0000, S_HALT]);

        let result = halt_for_programming(&mut probe, &config(100), None, &Cancellation::new());

        assert!(result.is_ok());
        assert_eq!(dhcsr_reads(&probe), 3);
        assert_eq!(
            probe.operations().last(),
            Some(&Operation::ReadWord { address: DHCSR })
        );
    }

    #[test]
    fn halt_on_the_last_permitted_read() {
        let mut probe = FakeProbe::new();
        probe.script_word_reads(DHCSR, [0, 0, S_HALT]);

        let result = halt_for_programming(&mut probe, &config(3), None, &Cancellation::new());

        assert!(result.is_ok());
        assert_eq!(dhcsr_reads(&probe), 3);
    }

    #[test]
    fn never_halts() {
        let mut probe = FakeProbe::new();
        probe.script_word_reads(DHCSR, [0x0008_0000]);

        let result = halt_for_programming(&mut probe, &config(10), None, &Cancellation::new());

        assert!(matches!(
            result,
            Err(ArmError::RetryExhausted {
                register: "DHCSR",
                attempts: 10,
                last_value: 0x0008_0000,
            })
        ));
        assert_eq!(dhcsr_reads(&probe), 10);
    }

    #[test]
    fn halt_sequence_order() {
        let mut probe = FakeProbe::new();

        let result = halt_for_programming(&mut probe, &config(10), None, &Cancellation::new());

        assert!(result.is_ok());
        assert_eq!(
            probe.operations(),
            &[
                Operation::InitDebug,
                Operation::WriteWord { address: DHCSR, value: 0xa05f_0001 },
                Operation::WriteDp { offset: 0x0, value: 0x1 },
                Operation::WriteWord { address: DHCSR, value: 0xa05f_0003 },
                Operation::ReadWord { address: DHCSR },
            ]
        );
    }

    #[test]
    fn mailbox_runs_between_enable_and_halt() {
        let mut probe = FakeProbe::new();
        let mailbox = DebugMailbox::new(2, MailboxConfig::default());

        let result =
            halt_for_programming(&mut probe, &config(10), Some(&mailbox), &Cancellation::new());

        assert!(result.is_ok());

        let operations = probe.operations();
        let first_ap = operations
            .iter()
            .position(|op| matches!(op, Operation::ReadAp { .. }))
            .unwrap();
        let abort = operations
            .iter()
            .position(|op| matches!(op, Operation::WriteDp { .. }))
            .unwrap();

        assert_eq!(
            operations[first_ap - 1],
            Operation::WriteWord { address: DHCSR, value: 0xa05f_0001 }
        );
        assert!(first_ap < abort);
    }

    #[test]
    fn mailbox_failure_is_fatal() {
        let mut probe = FakeProbe::new();
        probe.script_ap_reads(2, DebugMailbox::CSW, [0x21]);
        let mailbox = DebugMailbox::new(
            2,
            MailboxConfig {
                poll_limit: 4,
                ..Default::default()
            },
        );

        let result =
            halt_for_programming(&mut probe, &config(10), Some(&mailbox), &Cancellation::new());

        assert!(matches!(result, Err(ArmError::RetryExhausted { .. })));
        assert_eq!(
            probe.count(|op| *op == Operation::WriteWord { address: DHCSR, value: 0xa05f_0003 }),
            0
        );
    }

    #[test]
    fn failing_abort_is_ignored() {
        let mut probe = FakeProbe::new();
        probe.fail_dp_writes(TransportError::WaitResponse);

        let result = halt_for_programming(&mut probe, &config(10), None, &Cancellation::new());

        assert!(result.is_ok());
    }

    #[test]
    fn init_failure() {
        let mut probe = FakeProbe::new();
        probe.fail_init(TransportError::InitFailed);

        let result = halt_for_programming(&mut probe, &config(10), None, &Cancellation::new());

        assert!(matches!(
            result,
            Err(ArmError::Transport(TransportError::InitFailed))
        ));
        assert_eq!(probe.operations(), &[Operation::InitDebug]);
    }

    #[test]
    fn cancelled_while_waiting_for_halt() {
        let mut probe = FakeProbe::new();
        probe.script_word_reads(DHCSR, [0]);
        let cancel = Cancellation::new();
        cancel.cancel();

        let result = halt_for_programming(&mut probe, &config(10), None, &cancel);

        assert!(matches!(result, Err(ArmError::Cancelled)));
        assert_eq!(dhcsr_reads(&probe), 0);
    }

    #[test]
    fn other_states_use_the_software_routine() {
        let mut probe = FakeProbe::new();
        let sequence = DefaultResetSequence::create(&Settings::default());

        for state in [TargetState::ResetRun, TargetState::Attach, TargetState::Halt] {
            assert!(sequence.enter_state(&mut probe, state, &Cancellation::new()));
        }

        assert_eq!(
            probe.operations(),
            &[
                Operation::SetStateSw(TargetState::ResetRun),
                Operation::SetStateSw(TargetState::Attach),
                Operation::SetStateSw(TargetState::Halt),
            ]
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(TargetState::ProgramMode.to_string(), "halted for programming");
        assert_eq!(TargetState::ResetRun.to_string(), "reset and running");
    }
}
