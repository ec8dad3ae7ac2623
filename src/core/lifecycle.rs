//! Service lifecycle state machine.
//!
//! Every lifecycle request is validated against the transition table before it
//! is applied. The monitor consults this type before every tick, so it is the
//! single source of truth for whether scanning may happen.

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    Idle,
    Running,
    Suspended,
    Stopped,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    Start,
    Stop,
    Suspend,
    Resume,
    Destroy,
}

impl ServiceState {
    pub const ALL: [ServiceState; 5] = [
        ServiceState::Idle,
        ServiceState::Running,
        ServiceState::Suspended,
        ServiceState::Stopped,
        ServiceState::Destroyed,
    ];

    /// Target state for `transition`, or `None` when the table has no entry.
    pub fn next(self, transition: Transition) -> Option<ServiceState> {
        use ServiceState::*;
        use Transition::*;

        match (self, transition) {
            (Idle | Stopped, Start) => Some(Running),
            (Running | Suspended, Stop) => Some(Stopped),
            (Running, Suspend) => Some(Suspended),
            (Suspended, Resume) => Some(Running),
            (Stopped, Destroy) => Some(Destroyed),
            _ => None,
        }
    }
}

impl Transition {
    pub const ALL: [Transition; 5] = [
        Transition::Start,
        Transition::Stop,
        Transition::Suspend,
        Transition::Resume,
        Transition::Destroy,
    ];
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Idle => "idle",
            ServiceState::Running => "running",
            ServiceState::Suspended => "suspended",
            ServiceState::Stopped => "stopped",
            ServiceState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Suspend => "suspend",
            Transition::Resume => "resume",
            Transition::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: ServiceState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ServiceState::Idle,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Validate `transition` without applying it.
    pub fn check(&self, transition: Transition) -> Result<ServiceState> {
        self.state
            .next(transition)
            .ok_or(MonitorError::InvalidTransition {
                from: self.state,
                transition,
            })
    }

    /// Validate and apply `transition`. The state is untouched on error.
    pub fn apply(&mut self, transition: Transition) -> Result<ServiceState> {
        let target = self.check(transition)?;
        tracing::debug!("Lifecycle {} -> {} ({})", self.state, target, transition);
        self.state = target;
        Ok(target)
    }

    /// The chain of transitions that takes the current state to `Destroyed`.
    ///
    /// Running needs an implied stop, suspended needs an implied resume and
    /// stop. An already destroyed machine yields an empty plan.
    pub fn destroy_plan(&self) -> Result<Vec<Transition>> {
        match self.state {
            ServiceState::Destroyed => Ok(Vec::new()),
            ServiceState::Stopped => Ok(vec![Transition::Destroy]),
            ServiceState::Running => Ok(vec![Transition::Stop, Transition::Destroy]),
            ServiceState::Suspended => Ok(vec![
                Transition::Resume,
                Transition::Stop,
                Transition::Destroy,
            ]),
            ServiceState::Idle => Err(MonitorError::InvalidTransition {
                from: self.state,
                transition: Transition::Destroy,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    pub fn is_suspended(&self) -> bool {
        self.state == ServiceState::Suspended
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ServiceState::Destroyed
    }

    /// Running or suspended: the worker loop should stay alive.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ServiceState::Running | ServiceState::Suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(state: ServiceState) -> StateMachine {
        StateMachine { state }
    }

    #[test]
    fn test_happy_path() {
        let mut machine = StateMachine::new();
        assert_eq!(machine.apply(Transition::Start).unwrap(), ServiceState::Running);
        assert_eq!(machine.apply(Transition::Suspend).unwrap(), ServiceState::Suspended);
        assert_eq!(machine.apply(Transition::Resume).unwrap(), ServiceState::Running);
        assert_eq!(machine.apply(Transition::Stop).unwrap(), ServiceState::Stopped);
        assert_eq!(machine.apply(Transition::Start).unwrap(), ServiceState::Running);
        assert_eq!(machine.apply(Transition::Stop).unwrap(), ServiceState::Stopped);
        assert_eq!(machine.apply(Transition::Destroy).unwrap(), ServiceState::Destroyed);
        assert!(machine.is_destroyed());
    }

    #[test]
    fn test_illegal_transitions_leave_state_unchanged() {
        for state in ServiceState::ALL {
            for transition in Transition::ALL {
                let mut machine = machine_in(state);
                match state.next(transition) {
                    Some(target) => {
                        assert!(machine.check(transition).is_ok());
                        assert_eq!(machine.apply(transition).unwrap(), target);
                    }
                    None => {
                        let err = machine.apply(transition).unwrap_err();
                        assert!(matches!(
                            err,
                            MonitorError::InvalidTransition { from, transition: t }
                                if from == state && t == transition
                        ));
                        assert_eq!(machine.state(), state);
                    }
                }
            }
        }
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let mut machine = machine_in(ServiceState::Running);
        assert!(machine.apply(Transition::Start).is_err());
        assert!(machine.is_running());
    }

    #[test]
    fn test_destroy_plans() {
        assert_eq!(
            machine_in(ServiceState::Running).destroy_plan().unwrap(),
            vec![Transition::Stop, Transition::Destroy]
        );
        assert_eq!(
            machine_in(ServiceState::Suspended).destroy_plan().unwrap(),
            vec![Transition::Resume, Transition::Stop, Transition::Destroy]
        );
        assert_eq!(
            machine_in(ServiceState::Stopped).destroy_plan().unwrap(),
            vec![Transition::Destroy]
        );
        assert!(machine_in(ServiceState::Destroyed).destroy_plan().unwrap().is_empty());
        assert!(machine_in(ServiceState::Idle).destroy_plan().is_err());
    }

    #[test]
    fn test_destroy_plans_are_legal_chains() {
        for state in [ServiceState::Running, ServiceState::Suspended, ServiceState::Stopped] {
            let mut machine = machine_in(state);
            for transition in machine.destroy_plan().unwrap() {
                machine.apply(transition).unwrap();
            }
            assert!(machine.is_destroyed());
        }
    }

    #[test]
    fn test_is_active() {
        assert!(machine_in(ServiceState::Running).is_active());
        assert!(machine_in(ServiceState::Suspended).is_active());
        assert!(!machine_in(ServiceState::Idle).is_active());
        assert!(!machine_in(ServiceState::Stopped).is_active());
        assert!(!machine_in(ServiceState::Destroyed).is_active());
    }
}
