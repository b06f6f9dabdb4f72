//! Bootstrap run state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!            Start
//!   Idle ───────────► CheckingLock ── NoCredentials ─────────────┐
//!    ▲                 │    │    │                                │
//!    │   LockContended │    │    │ LockAcquired                   │
//!    │                 ▼    │    ▼                                │
//!    │   WaitingForSession  │  Exchanging ── Exchanged ──► Verifying
//!    │         │            │                                 │
//!    │         │ SessionAppeared  SessionPresent              │ Verified
//!    │         ▼            ▼                                 ▼
//!    │       FetchingProfile ◄────────────────────────────────┘
//!    │              │ ProfileFetched
//!    │              ▼
//!    │          Deciding ── Decided ──► Navigating ◄──────────────┘
//!    │                                     │
//!    └──────────── Navigated ──────────────┘
//!
//!   any working state ── Fail ──► Failed ── Recovered ──► Idle
//!   any working state ── Abandon ──► Idle   (target unmounted)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub bootstrap_machine(Idle)

    Idle => {
        Start => CheckingLock
    },
    CheckingLock => {
        LockContended => WaitingForSession,
        SessionPresent => FetchingProfile,
        LockAcquired => Exchanging,
        NoCredentials => Navigating,
        Fail => Failed,
        Abandon => Idle
    },
    WaitingForSession => {
        SessionAppeared => FetchingProfile,
        Fail => Failed,
        Abandon => Idle
    },
    Exchanging => {
        Exchanged => Verifying,
        Fail => Failed,
        Abandon => Idle
    },
    Verifying => {
        Verified => FetchingProfile,
        Fail => Failed,
        Abandon => Idle
    },
    FetchingProfile => {
        ProfileFetched => Deciding,
        Fail => Failed,
        Abandon => Idle
    },
    Deciding => {
        Decided => Navigating,
        Fail => Failed,
        Abandon => Idle
    },
    Navigating => {
        Navigated => Idle,
        Fail => Failed,
        Abandon => Idle
    },
    Failed => {
        Recovered => Idle
    }
}

pub use bootstrap_machine::Input as BootstrapMachineInput;
pub use bootstrap_machine::State as BootstrapMachineState;
pub use bootstrap_machine::StateMachine as BootstrapMachine;

/// Bootstrap state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    Idle,
    CheckingLock,
    WaitingForSession,
    Exchanging,
    Verifying,
    FetchingProfile,
    Deciding,
    Navigating,
    Failed,
}

impl From<&BootstrapMachineState> for BootstrapState {
    fn from(state: &BootstrapMachineState) -> Self {
        match state {
            BootstrapMachineState::Idle => BootstrapState::Idle,
            BootstrapMachineState::CheckingLock => BootstrapState::CheckingLock,
            BootstrapMachineState::WaitingForSession => BootstrapState::WaitingForSession,
            BootstrapMachineState::Exchanging => BootstrapState::Exchanging,
            BootstrapMachineState::Verifying => BootstrapState::Verifying,
            BootstrapMachineState::FetchingProfile => BootstrapState::FetchingProfile,
            BootstrapMachineState::Deciding => BootstrapState::Deciding,
            BootstrapMachineState::Navigating => BootstrapState::Navigating,
            BootstrapMachineState::Failed => BootstrapState::Failed,
        }
    }
}

/// Payload for bootstrap state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapStateChangedPayload {
    pub state: BootstrapState,
    /// Identifier of the run that caused the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let machine = BootstrapMachine::new();
        assert_eq!(*machine.state(), BootstrapMachineState::Idle);
    }

    #[test]
    fn test_deep_link_flow() {
        let mut machine = BootstrapMachine::new();

        for (input, expected) in [
            (BootstrapMachineInput::Start, BootstrapMachineState::CheckingLock),
            (BootstrapMachineInput::LockAcquired, BootstrapMachineState::Exchanging),
            (BootstrapMachineInput::Exchanged, BootstrapMachineState::Verifying),
            (BootstrapMachineInput::Verified, BootstrapMachineState::FetchingProfile),
            (BootstrapMachineInput::ProfileFetched, BootstrapMachineState::Deciding),
            (BootstrapMachineInput::Decided, BootstrapMachineState::Navigating),
            (BootstrapMachineInput::Navigated, BootstrapMachineState::Idle),
        ] {
            machine.consume(&input).unwrap();
            assert_eq!(*machine.state(), expected);
        }
    }

    #[test]
    fn test_existing_session_skips_exchange() {
        let mut machine = BootstrapMachine::new();
        machine.consume(&BootstrapMachineInput::Start).unwrap();
        machine
            .consume(&BootstrapMachineInput::SessionPresent)
            .unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::FetchingProfile);
    }

    #[test]
    fn test_lock_loser_waits() {
        let mut machine = BootstrapMachine::new();
        machine.consume(&BootstrapMachineInput::Start).unwrap();
        machine.consume(&BootstrapMachineInput::LockContended).unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::WaitingForSession);

        machine
            .consume(&BootstrapMachineInput::SessionAppeared)
            .unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::FetchingProfile);
    }

    #[test]
    fn test_no_credentials_goes_straight_to_navigation() {
        let mut machine = BootstrapMachine::new();
        machine.consume(&BootstrapMachineInput::Start).unwrap();
        machine.consume(&BootstrapMachineInput::NoCredentials).unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::Navigating);
    }

    #[test]
    fn test_failure_recovers_to_idle() {
        let mut machine = BootstrapMachine::new();
        machine.consume(&BootstrapMachineInput::Start).unwrap();
        machine.consume(&BootstrapMachineInput::LockAcquired).unwrap();
        machine.consume(&BootstrapMachineInput::Fail).unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::Failed);

        // Cannot start a new run without recovering first
        assert!(machine.consume(&BootstrapMachineInput::Start).is_err());

        machine.consume(&BootstrapMachineInput::Recovered).unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::Idle);
    }

    #[test]
    fn test_cannot_skip_verification() {
        let mut machine = BootstrapMachine::new();
        machine.consume(&BootstrapMachineInput::Start).unwrap();
        machine.consume(&BootstrapMachineInput::LockAcquired).unwrap();
        machine.consume(&BootstrapMachineInput::Exchanged).unwrap();

        assert!(machine
            .consume(&BootstrapMachineInput::ProfileFetched)
            .is_err());
        assert_eq!(*machine.state(), BootstrapMachineState::Verifying);
    }

    #[test]
    fn test_abandon_from_working_state() {
        let mut machine = BootstrapMachine::new();
        machine.consume(&BootstrapMachineInput::Start).unwrap();
        machine.consume(&BootstrapMachineInput::SessionPresent).unwrap();
        machine.consume(&BootstrapMachineInput::Abandon).unwrap();
        assert_eq!(*machine.state(), BootstrapMachineState::Idle);
    }

    #[test]
    fn test_idle_rejects_everything_but_start() {
        let mut machine = BootstrapMachine::new();
        assert!(machine.consume(&BootstrapMachineInput::Fail).is_err());
        assert!(machine.consume(&BootstrapMachineInput::Abandon).is_err());
        assert!(machine.consume(&BootstrapMachineInput::Navigated).is_err());
    }

    #[test]
    fn test_state_conversion() {
        let machine = BootstrapMachine::new();
        let state = BootstrapState::from(machine.state());
        assert_eq!(state, BootstrapState::Idle);
    }

    #[test]
    fn test_payload_serialization() {
        let payload = BootstrapStateChangedPayload {
            state: BootstrapState::FetchingProfile,
            run_id: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"state":"fetching_profile"}"#);
    }
}
