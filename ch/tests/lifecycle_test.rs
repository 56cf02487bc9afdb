//! Lifecycle properties over arbitrary close/quit/interrupt sequences

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chomka::config::LifecycleConfig;
use chomka::{
    Bridge, BridgeError, CloseDecision, ConfirmChoice, LifecycleController, Notification, ShutdownState,
    TerminationCause,
};
use proptest::prelude::*;
use tokio::runtime::Handle;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Confirm,
    Notify(Notification),
    Destroy,
}

#[derive(Default)]
struct ScriptedBridge {
    answers: Mutex<VecDeque<ConfirmChoice>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBridge {
    fn answer_next(&self, choice: ConfirmChoice) {
        self.answers.lock().unwrap().push_back(choice);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Bridge for ScriptedBridge {
    fn confirm_quit(&self) -> ConfirmChoice {
        self.calls.lock().unwrap().push(Call::Confirm);
        self.answers.lock().unwrap().pop_front().unwrap_or(ConfirmChoice::Cancelled)
    }

    fn notify(&self, notification: &Notification) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(Call::Notify(notification.clone()));
        Ok(())
    }

    fn destroy_window(&self) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(Call::Destroy);
        Ok(())
    }

    fn choose_folder(&self) -> Option<PathBuf> {
        None
    }

    fn pick_image(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Close(ConfirmChoice),
    Quit,
    Interrupt,
    Advance(u64),
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => prop_oneof![
            Just(ConfirmChoice::Yes),
            Just(ConfirmChoice::No),
            Just(ConfirmChoice::Cancelled),
        ]
        .prop_map(Event::Close),
        1 => Just(Event::Quit),
        1 => Just(Event::Interrupt),
        2 => (0u64..70_000).prop_map(Event::Advance),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn run_events(events: &[Event]) -> Result<(), TestCaseError> {
    paused_runtime().block_on(async {
        let bridge = Arc::new(ScriptedBridge::default());
        let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
        let lc = LifecycleController::new(dyn_bridge, LifecycleConfig::default(), Handle::current());
        let mut accepted_yes = false;

        for event in events {
            let before = lc.state();
            let calls_before = bridge.calls().len();

            match *event {
                Event::Close(choice) => {
                    bridge.answer_next(choice);
                    let decision = lc.on_close_requested();
                    match before {
                        ShutdownState::Terminal => {
                            prop_assert_eq!(decision, CloseDecision::Allow);
                            prop_assert_eq!(bridge.calls().len(), calls_before);
                        }
                        ShutdownState::SavingAndQuitting => {
                            prop_assert_eq!(decision, CloseDecision::Deny);
                            prop_assert_eq!(bridge.calls().len(), calls_before);
                        }
                        _ => match choice {
                            ConfirmChoice::Yes => {
                                accepted_yes = true;
                                prop_assert_eq!(decision, CloseDecision::Deny);
                                prop_assert_eq!(lc.state(), ShutdownState::SavingAndQuitting);
                            }
                            ConfirmChoice::No => {
                                prop_assert_eq!(decision, CloseDecision::Allow);
                                prop_assert_eq!(lc.state(), ShutdownState::Terminal);
                            }
                            ConfirmChoice::Cancelled => {
                                prop_assert_eq!(decision, CloseDecision::Deny);
                                prop_assert_eq!(lc.state(), before);
                                prop_assert_eq!(bridge.calls()[calls_before..].to_vec(), vec![Call::Confirm]);
                            }
                        },
                    }
                    // Unused scripted answers must not leak into the next prompt
                    bridge.answers.lock().unwrap().clear();
                }
                Event::Quit => lc.request_quit(),
                Event::Interrupt => lc.terminate(TerminationCause::Interrupted),
                Event::Advance(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            }

            if before == ShutdownState::Terminal {
                prop_assert_eq!(lc.state(), ShutdownState::Terminal);
                prop_assert_eq!(bridge.calls().len(), calls_before);
            }
            let destroys = bridge.calls().iter().filter(|c| **c == Call::Destroy).count();
            prop_assert!(destroys <= 1);
        }

        // Whatever happened, an accepted save-and-quit always ends
        tokio::time::sleep(Duration::from_secs(61)).await;
        if accepted_yes {
            prop_assert_eq!(lc.state(), ShutdownState::Terminal);
        }
        Ok(())
    })
}

proptest! {
    #[test]
    fn prop_lifecycle_invariants(events in proptest::collection::vec(arb_event(), 1..24)) {
        run_events(&events)?;
    }
}

#[test]
fn test_stalled_ui_is_cut_off_by_watchdog() {
    paused_runtime().block_on(async {
        let bridge = Arc::new(ScriptedBridge::default());
        bridge.answer_next(ConfirmChoice::Yes);
        let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
        let lc = LifecycleController::new(dyn_bridge, LifecycleConfig::default(), Handle::current());

        assert_eq!(lc.on_close_requested(), CloseDecision::Deny);

        let started = tokio::time::Instant::now();
        let cause = lc.wait_terminated().await;

        assert_eq!(cause, TerminationCause::Watchdog);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61), "{:?}", elapsed);
        assert_eq!(
            bridge.calls(),
            vec![
                Call::Confirm,
                Call::Notify(Notification::BeginShutdown),
                Call::Destroy
            ]
        );
    });
}
