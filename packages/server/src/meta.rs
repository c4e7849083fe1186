//! The `meta` endpoints served by every installer server, and the
//! application state they report.
//!
//! | Route | Handler | Notes |
//! |-------|---------|-------|
//! | `GET /meta/status?cur=` | `status_GET` | Usable before start; long-polls while the state equals `cur` |
//! | `POST /meta/confirm?tty=` | `confirm_POST` | Only valid in `NEEDS_CONFIRMATION` |
//! | `POST /meta/echo` | `echo_POST` | Returns its JSON payload untouched |

use std::sync::{Arc, Mutex};

use installrpc::{
    Annotation, EnumDef, EnumValue, EnumVariant, Field, Record, RecordDef, SerializationError,
    Typed, Value,
};
use installrpc_api::{Api, ApiDefinitionError, Endpoint, MethodDef};
use tokio::sync::watch;
use tracing::info;

use crate::controller::{Args, Controller, Handler};
use crate::error::AppError;
use crate::gate::StartGate;

// ---------------------------------------------------------------------------
// ApplicationState
// ---------------------------------------------------------------------------

/// Coarse progress of the installer, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationState {
    StartingUp,
    CloudInitWait,
    EarlyCommands,
    NeedsConfirmation,
    Waiting,
    Running,
    UuRunning,
    LateCommands,
    Done,
    Error,
    Exited,
}

impl ApplicationState {
    pub const ALL: [ApplicationState; 11] = [
        ApplicationState::StartingUp,
        ApplicationState::CloudInitWait,
        ApplicationState::EarlyCommands,
        ApplicationState::NeedsConfirmation,
        ApplicationState::Waiting,
        ApplicationState::Running,
        ApplicationState::UuRunning,
        ApplicationState::LateCommands,
        ApplicationState::Done,
        ApplicationState::Error,
        ApplicationState::Exited,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ApplicationState::StartingUp => "STARTING_UP",
            ApplicationState::CloudInitWait => "CLOUD_INIT_WAIT",
            ApplicationState::EarlyCommands => "EARLY_COMMANDS",
            ApplicationState::NeedsConfirmation => "NEEDS_CONFIRMATION",
            ApplicationState::Waiting => "WAITING",
            ApplicationState::Running => "RUNNING",
            ApplicationState::UuRunning => "UU_RUNNING",
            ApplicationState::LateCommands => "LATE_COMMANDS",
            ApplicationState::Done => "DONE",
            ApplicationState::Error => "ERROR",
            ApplicationState::Exited => "EXITED",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl Typed for ApplicationState {
    fn annotation() -> Annotation {
        // Values count from 1 in declaration order.
        let def = Self::ALL
            .iter()
            .zip(1i64..)
            .fold(EnumDef::new("ApplicationState"), |def, (s, n)| {
                def.variant_with_value(s.name(), n)
            });
        Annotation::enumeration(def)
    }

    fn into_value(self) -> Value {
        Value::Enum(EnumValue::known("ApplicationState", self.name()))
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match &value {
            Value::Enum(EnumValue {
                variant: EnumVariant::Known(name),
                ..
            }) => Self::from_name(name).ok_or_else(|| {
                SerializationError::new("", format!("unknown ApplicationState {name:?}"))
            }),
            other => Err(SerializationError::new(
                "",
                format!("expected ApplicationState, found {}", other.kind()),
            )),
        }
    }
}

/// `ApplicationStatus` as sent by `GET /meta/status`.
pub fn status_annotation() -> Annotation {
    Annotation::record(
        RecordDef::new("ApplicationStatus")
            .field(Field::new("state", ApplicationState::annotation()))
            .field(Field::new("confirming_tty", Annotation::Str))
            .field(Field::new("interactive", Annotation::optional(Annotation::Bool))),
    )
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Server-wide state shared by the meta controller and the status middleware.
pub struct Application {
    state: watch::Sender<ApplicationState>,
    confirming_tty: Mutex<String>,
    interactive: Option<bool>,
    gate: Arc<StartGate>,
}

impl Application {
    pub fn new(gate: Arc<StartGate>, interactive: Option<bool>) -> Self {
        let (state, _) = watch::channel(ApplicationState::StartingUp);
        Self {
            state,
            confirming_tty: Mutex::new(String::new()),
            interactive,
            gate,
        }
    }

    pub fn state(&self) -> ApplicationState {
        *self.state.borrow()
    }

    /// The gate [`controllers_started`](Self::controllers_started) opens.
    pub fn gate(&self) -> Arc<StartGate> {
        Arc::clone(&self.gate)
    }

    pub fn subscribe(&self) -> watch::Receiver<ApplicationState> {
        self.state.subscribe()
    }

    pub fn update_state(&self, state: ApplicationState) {
        let changed = self.state.send_if_modified(|cur| {
            let changed = *cur != state;
            *cur = state;
            changed
        });
        if changed {
            info!(state = state.name(), "application state changed");
        }
    }

    /// Move past start-up and release every request waiting on the start
    /// gate. The state changes first, so released requests observe it.
    pub fn controllers_started(&self, needs_confirmation: bool) {
        self.update_state(if needs_confirmation {
            ApplicationState::NeedsConfirmation
        } else {
            ApplicationState::Waiting
        });
        self.gate.set();
    }

    pub fn confirming_tty(&self) -> String {
        self.confirming_tty
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn confirm(&self, tty: String) -> Result<(), AppError> {
        let state = self.state();
        if state != ApplicationState::NeedsConfirmation {
            return Err(AppError::recoverable(
                "NotConfirmable",
                "Nothing to confirm",
                format!("cannot confirm in state {}", state.name()),
            )
            .non_reportable());
        }
        *self
            .confirming_tty
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = tty;
        self.update_state(ApplicationState::Running);
        Ok(())
    }

    fn status(&self) -> Value {
        Value::from(
            Record::new("ApplicationStatus")
                .with("state", self.state().into_value())
                .with("confirming_tty", self.confirming_tty())
                .with("interactive", self.interactive),
        )
    }

    /// The `meta` controller, to be bound at [`api()`]'s `meta` node.
    pub fn controller(self: &Arc<Self>) -> Controller {
        let status_app = Arc::clone(self);
        let status = Handler::new(move |mut args: Args| {
            let app = Arc::clone(&status_app);
            async move {
                let cur: Option<ApplicationState> = args.take_as("cur")?;
                let mut rx = app.subscribe();
                let now = *rx.borrow_and_update();
                if cur == Some(now) {
                    // A closed channel means the application is going away;
                    // report whatever the state is.
                    let _ = rx.changed().await;
                }
                Ok::<_, AppError>(app.status())
            }
        })
        .param("cur", Annotation::optional(ApplicationState::annotation()));

        let confirm_app = Arc::clone(self);
        let confirm = Handler::new(move |mut args: Args| {
            let app = Arc::clone(&confirm_app);
            async move {
                let tty: String = args.take_as("tty")?;
                app.confirm(tty)
            }
        })
        .param("tty", Annotation::Str);

        let echo = Handler::new(|mut args: Args| async move { args.take("data") })
            .param("data", Annotation::Any);

        Controller::new("Meta")
            .on("status_GET", status)
            .on("confirm_POST", confirm)
            .on("echo_POST", echo)
    }
}

/// The API served by the `installrpc-server` binary.
pub fn api() -> Result<Api, ApiDefinitionError> {
    Api::define(
        Endpoint::root("API").child(
            Endpoint::new("meta")
                .child(
                    Endpoint::new("status").method(
                        MethodDef::get()
                            .param_with_default(
                                "cur",
                                Annotation::optional(ApplicationState::annotation()),
                                Value::None,
                            )
                            .returns(status_annotation())
                            .allowed_before_start(),
                    ),
                )
                .child(
                    Endpoint::new("confirm")
                        .method(MethodDef::post().param("tty", Annotation::Str)),
                )
                .child(
                    Endpoint::new("echo").method(
                        MethodDef::post()
                            .payload("data", Annotation::Any)
                            .returns(Annotation::Any),
                    ),
                ),
        ),
    )
}
