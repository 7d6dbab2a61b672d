//! The debug mailbox of NXP parts.
//!
//! After power up, or when the boot ROM has disabled debugging, the debug
//! logic of these parts ignores halt requests until a debug session has
//! been requested through a small request/acknowledge protocol on a
//! dedicated access port.

use crate::architecture::arm::ArmError;
use crate::config::MailboxConfig;
use crate::probe::{Cancellation, DebugTransport};

/// Result of a debug mailbox handshake, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, docsplay::Display)]
pub enum DebugMailboxOutcome {
    /// debug session started
    Success,
    /// a mailbox register access failed
    TransportError,
    /// the mailbox did not acknowledge in time
    Timeout,
    /// the handshake was cancelled
    Cancelled,
}

impl From<&Result<(), ArmError>> for DebugMailboxOutcome {
    fn from(result: &Result<(), ArmError>) -> Self {
        match result {
            Ok(()) => DebugMailboxOutcome::Success,
            Err(ArmError::RetryExhausted { .. }) => DebugMailboxOutcome::Timeout,
            Err(ArmError::Cancelled) => DebugMailboxOutcome::Cancelled,
            Err(ArmError::Transport(_) | ArmError::Other(_)) => DebugMailboxOutcome::TransportError,
        }
    }
}

/// The debug mailbox access port of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMailbox {
    /// Index of the mailbox access port.
    pub ap: u8,
    /// Poll bound and delays of the handshake.
    pub config: MailboxConfig,
}

impl DebugMailbox {
    /// Control and status word.
    pub const CSW: u8 = 0x00;
    /// Request register.
    pub const REQ: u8 = 0x04;
    /// Return value register.
    pub const RET: u8 = 0x08;
    /// Identification register.
    pub const ID: u8 = 0xFC;

    /// CSW value requesting a reset and resynchronization of the mailbox.
    pub const RESYNC_REQUEST: u32 = 0x21;
    /// REQ command starting a debug session.
    pub const START_DEBUG_SESSION: u32 = 0x7;

    /// Creates a mailbox on access port `ap`.
    pub fn new(ap: u8, config: MailboxConfig) -> Self {
        Self { ap, config }
    }

    /// Runs the handshake which (re)starts a debug session.
    ///
    /// Both polls are bounded by [`MailboxConfig::poll_limit`]. Running out
    /// of reads fails with [`ArmError::RetryExhausted`], carrying the last
    /// value read.
    #[tracing::instrument(skip_all, fields(ap = self.ap))]
    pub fn start_debug_session(
        &self,
        probe: &mut dyn DebugTransport,
        cancel: &Cancellation,
    ) -> Result<(), ArmError> {
        let id = probe.read_ap_register(self.ap, Self::ID)?;
        tracing::debug!("Debug mailbox ID: {id:#010x}");

        probe.write_ap_register(self.ap, Self::CSW, Self::RESYNC_REQUEST)?;
        probe.delay(self.config.command_delay);

        self.poll_until_clear(probe, cancel, "mailbox CSW", Self::CSW, u32::MAX)?;

        let id = probe.read_ap_register(self.ap, Self::ID)?;
        tracing::debug!("Debug mailbox ID after resync: {id:#010x}");

        probe.write_ap_register(self.ap, Self::REQ, Self::START_DEBUG_SESSION)?;
        probe.delay(self.config.command_delay);

        // Only the low half word carries the status of the command.
        self.poll_until_clear(probe, cancel, "mailbox RET", Self::RET, 0xffff)?;

        probe.delay(self.config.settle_delay);

        tracing::debug!("Debug session started");

        Ok(())
    }

    fn poll_until_clear(
        &self,
        probe: &mut dyn DebugTransport,
        cancel: &Cancellation,
        register: &'static str,
        offset: u8,
        mask: u32,
    ) -> Result<(), ArmError> {
        let mut last_value = 0;

        for _ in 0..self.config.poll_limit {
            cancel.check()?;

            last_value = probe.read_ap_register(self.ap, offset)?;
            tracing::trace!("{register}: {last_value:#010x}");

            if last_value & mask == 0 {
                return Ok(());
            }
        }

        tracing::warn!(
            "{register} still {last_value:#010x} after {} reads",
            self.config.poll_limit
        );

        Err(ArmError::RetryExhausted {
            register,
            attempts: self.config.poll_limit,
            last_value,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::probe::fake_probe::{FakeProbe, Operation};
    use crate::probe::TransportError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const AP: u8 = 2;

    fn mailbox(poll_limit: u32) -> DebugMailbox {
        DebugMailbox::new(
            AP,
            MailboxConfig {
                poll_limit,
                ..Default::default()
            },
        )
    }

    fn reads_of(probe: &FakeProbe, offset: u8) -> usize {
        probe.count(|op| *op == Operation::ReadAp { ap: AP, offset })
    }

    #[test]
    fn handshake_converges() {
        let mut probe = FakeProbe::new();
        probe.script_ap_reads(AP, DebugMailbox::CSW, [0x21, 0]);
        probe.script_ap_reads(AP, DebugMailbox::RET, [0xffff, 0]);

        let result = mailbox(10).start_debug_session(&mut probe, &Cancellation::new());

        assert_eq!(DebugMailboxOutcome::from(&result), DebugMailboxOutcome::Success);
        assert_eq!(
            probe.operations(),
            &[
                Operation::ReadAp { ap: AP, offset: 0xfc },
                Operation::WriteAp { ap: AP, offset: 0x00, value: 0x21 },
                Operation::Delay(Duration::from_millis(5)),
                Operation::ReadAp { ap: AP, offset: 0x00 },
                Operation::ReadAp { ap: AP, offset: 0x00 },
                Operation::ReadAp { ap: AP, offset: 0xfc },
                Operation::WriteAp { ap: AP, offset: 0x04, value: 0x7 },
                Operation::Delay(Duration::from_millis(5)),
                Operation::ReadAp { ap: AP, offset: 0x08 },
                Operation::ReadAp { ap: AP, offset: 0x08 },
                Operation::Delay(Duration::from_millis(100)),
            ]
        );
    }

    #[test]
    fn csw_never_clears() {
        let mut probe = FakeProbe::new();
        probe.script_ap_reads(AP, DebugMailbox::CSW, [0x21]);

        let result = mailbox(50).start_debug_session(&mut probe, &Cancellation::new());

        assert_eq!(DebugMailboxOutcome::from(&result), DebugMailboxOutcome::Timeout);
        assert!(matches!(
            result,
            Err(ArmError::RetryExhausted {
                register: "mailbox CSW",
                attempts: 50,
                last_value: 0x21,
            })
        ));
        assert_eq!(reads_of(&probe, DebugMailbox::CSW), 50);
        assert_eq!(
            probe.count(|op| matches!(op, Operation::WriteAp { offset: 0x04, .. })),
            0
        );
    }

    #[test]
    fn ret_ignores_the_upper_half_word() {
        let mut probe = FakeProbe::new();
        probe.script_ap_reads(AP, DebugMailbox::RET, [0xabcd_0000]);

        let result = mailbox(10).start_debug_session(&mut probe, &Cancellation::new());

        assert!(result.is_ok());
        assert_eq!(reads_of(&probe, DebugMailbox::RET), 1);
    }

    #[test]
    fn ret_never_acknowledges() {
        let mut probe = FakeProbe::new();
        probe.script_ap_reads(AP, DebugMailbox::RET, [0x0000_0001]);

        let result = mailbox(7).start_debug_session(&mut probe, &Cancellation::new());

        assert!(matches!(
            result,
            Err(ArmError::RetryExhausted {
                register: "mailbox RET",
                attempts: 7,
                last_value: 1,
            })
        ));
        assert_eq!(reads_of(&probe, DebugMailbox::RET), 7);
    }

    #[test]
    fn transport_error_aborts() {
        let mut probe = FakeProbe::new();
        probe.fail_ap_reads(AP, DebugMailbox::ID, TransportError::NoAcknowledge);

        let result = mailbox(10).start_debug_session(&mut probe, &Cancellation::new());

        assert_eq!(
            DebugMailboxOutcome::from(&result),
            DebugMailboxOutcome::TransportError
        );
        assert_eq!(
            probe.operations(),
            &[Operation::ReadAp { ap: AP, offset: 0xfc }]
        );
    }

    #[test]
    fn cancelled_before_polling() {
        let mut probe = FakeProbe::new();
        let cancel = Cancellation::new();
        cancel.cancel();

        let result = mailbox(10).start_debug_session(&mut probe, &cancel);

        assert_eq!(DebugMailboxOutcome::from(&result), DebugMailboxOutcome::Cancelled);
        assert_eq!(reads_of(&probe, DebugMailbox::CSW), 0);
    }
}
