//! The execution driver: builds the symbol environment, loads modules in link order, runs the
//! entry point and classifies how the run ended.

use std::{fmt::Display, io::Write};

use tracing::{error, info, warn};
use wasmtime::{Engine, Extern, Memory, MemoryType, Store, Trap, TypedFunc};

use crate::{
    config::HostConfig,
    fault::{Fault, TrapKind},
    host::Host,
    memory::MemoryError,
    module::{self, LoadedModule},
    source::ModuleSource,
    symbol::StubLibrary,
    WasmlinkError, WasmlinkErrorKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    LoadingStubs,
    /// Loading startup modules; `remaining` counts the ones not yet loaded.
    LoadingModules { remaining: usize },
    LoadingMain,
    Running,
    Terminated,
}

impl Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Initializing => f.write_str("initializing"),
            DriverState::LoadingStubs => f.write_str("loading stubs"),
            DriverState::LoadingModules { remaining } => {
                write!(f, "loading modules ({} remaining)", remaining)
            }
            DriverState::LoadingMain => f.write_str("loading main"),
            DriverState::Running => f.write_str("running"),
            DriverState::Terminated => f.write_str("terminated"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The entry point returned.
    Returned {
        module: String,
        entry: String,
        status: i32,
    },
    /// The program asked to stop, through `exit`, `abort` and friends.
    Terminated { status: i32, reason: String },
    /// A stub without an implementation was called.
    Unimplemented { what: String },
    Trap(TrapKind),
    Unknown { message: String },
}

impl Outcome {
    /// Recover the outcome from the error a call into wasm failed with.
    pub fn classify(err: &anyhow::Error) -> Self {
        if let Some(fault) = err.downcast_ref::<Fault>() {
            return match fault {
                Fault::Terminate { status, reason } => Outcome::Terminated {
                    status: *status,
                    reason: reason.clone(),
                },
                Fault::Unimplemented { what } => Outcome::Unimplemented { what: what.clone() },
                Fault::Trap(kind) => Outcome::Trap(*kind),
            };
        }
        if err.downcast_ref::<MemoryError>().is_some() {
            return Outcome::Trap(TrapKind::MemoryOutOfBounds);
        }
        if let Some(kind) = err.downcast_ref::<Trap>().and_then(TrapKind::from_trap) {
            return Outcome::Trap(kind);
        }
        Outcome::Unknown {
            message: format!("{:#}", err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Returned { status: 0, .. } | Outcome::Terminated { status: 0, .. }
        )
    }

    /// Whether the failure is passed on to whoever started the run.
    pub fn reraises(&self) -> bool {
        !self.is_success()
    }

    /// The status the program reported. Failures that carry no status report 1.
    pub fn exit_status(&self) -> i32 {
        match self {
            Outcome::Returned { status, .. } | Outcome::Terminated { status, .. } => *status,
            _ => 1,
        }
    }

    /// A process exit code. Non-zero statuses never truncate to zero.
    pub fn exit_code(&self) -> u8 {
        match self.exit_status() {
            0 => 0,
            status => match status as u8 {
                0 => 1,
                code => code,
            },
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Returned {
                module,
                entry,
                status,
            } => write!(f, "{}::{}() returned {}", module, entry, status),
            Outcome::Terminated { reason, .. } => write!(f, "Program terminated with: {}", reason),
            Outcome::Unimplemented { what } => write!(f, "Not yet implemented: {}", what),
            Outcome::Trap(kind) => write!(f, "Runtime trap: {}", kind),
            Outcome::Unknown { message } => write!(f, "Unknown failure: {}", message),
        }
    }
}

struct MainModule {
    module: LoadedModule,
    entry: TypedFunc<(), i32>,
}

pub struct Driver {
    store: Store<Host>,
    state: DriverState,
    modules: Vec<LoadedModule>,
    main: Option<MainModule>,
}

impl Driver {
    /// Set up a fresh host with an initial linear memory of the configured size.
    pub fn new(
        config: HostConfig,
        source: Box<dyn ModuleSource + Send>,
        sink: Box<dyn Write + Send>,
    ) -> Result<Self, WasmlinkError> {
        let engine = Engine::default();
        let pages = config.initial_pages;
        let mut store = Store::new(&engine, Host::new(config, source, sink));
        let memory = Memory::new(&mut store, MemoryType::new(pages, None))
            .map_err(|_| WasmlinkErrorKind::MemoryCreateFail { pages })?;
        let handle = store.data_mut().memory.install(memory, "host");
        info!("created initial memory of {} pages as {}", pages, handle);
        Ok(Self {
            store,
            state: DriverState::Initializing,
            modules: vec![],
            main: None,
        })
    }

    fn invalid_state(&self, action: &str) -> WasmlinkError {
        WasmlinkErrorKind::InvalidState {
            state: self.state.to_string(),
            action: action.to_string(),
        }
        .into()
    }

    fn require(&self, ok: bool, action: &str) -> Result<(), WasmlinkError> {
        if ok {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn transition(&mut self, state: DriverState) {
        info!("driver: {} -> {}", self.state, state);
        self.state = state;
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn store(&self) -> &Store<Host> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<Host> {
        &mut self.store
    }

    pub fn host(&self) -> &Host {
        self.store.data()
    }

    /// Startup modules, in the order they were loaded.
    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    pub fn main_module(&self) -> Option<&LoadedModule> {
        self.main.as_ref().map(|m| &m.module)
    }

    /// Flatten the stub libraries into the symbol environment, in order.
    pub fn load_stubs(&mut self, libraries: &[StubLibrary]) -> Result<(), WasmlinkError> {
        self.require(self.state == DriverState::Initializing, "load stubs")?;
        self.transition(DriverState::LoadingStubs);
        self.store.data_mut().env.flatten(libraries);
        info!(
            "symbol environment has {} entries from {} stub libraries",
            self.store.data().env.len(),
            libraries.len()
        );
        Ok(())
    }

    /// Load the startup modules in reverse of the order given, merging each one's exported
    /// functions into the environment, so that earlier modules can use later ones.
    pub fn load_modules<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), WasmlinkError> {
        self.require(self.state == DriverState::LoadingStubs, "load modules")?;
        self.transition(DriverState::LoadingModules {
            remaining: names.len(),
        });
        for (idx, name) in names.iter().enumerate().rev() {
            let module = module::load(&mut self.store, name.as_ref())?;
            let overrides = self.store.data_mut().env.merge_exports(&module);
            info!("merged exports of {} ({} overrides)", module, overrides);
            self.modules.push(module);
            self.state = DriverState::LoadingModules { remaining: idx };
        }
        Ok(())
    }

    /// Load the main module against the fully merged environment and look up its entry point.
    pub fn load_main(&mut self, name: &str) -> Result<(), WasmlinkError> {
        self.require(
            matches!(
                self.state,
                DriverState::LoadingStubs | DriverState::LoadingModules { remaining: 0 }
            ),
            "load the main module",
        )?;
        self.transition(DriverState::LoadingMain);
        let module = module::load(&mut self.store, name)?;
        let entry_name = self.store.data().config.entry.clone();
        let entry = match module.lookup_export(&entry_name) {
            Some(Extern::Func(func)) => func.typed::<(), i32>(&self.store).ok(),
            Some(_) => None,
            None => {
                return Err(WasmlinkErrorKind::MissingEntry {
                    module: name.to_string(),
                    entry: entry_name,
                }
                .into())
            }
        };
        let entry = entry.ok_or_else(|| WasmlinkErrorKind::BadEntrySignature {
            module: name.to_string(),
            entry: entry_name,
        })?;
        self.main = Some(MainModule { module, entry });
        Ok(())
    }

    /// Call the entry point, flush buffered output and report how the run ended. The
    /// classification line is written to the output sink after the program's own output.
    pub fn run(&mut self) -> Result<Outcome, WasmlinkError> {
        let main = self
            .main
            .as_ref()
            .filter(|_| self.state == DriverState::LoadingMain);
        let Some(main) = main else {
            return Err(self.invalid_state("run"));
        };
        let entry = main.entry.clone();
        let module_name = main.module.name().to_string();
        let entry_name = self.store.data().config.entry.clone();

        self.transition(DriverState::Running);
        let outcome = match entry.call(&mut self.store, ()) {
            Ok(status) => Outcome::Returned {
                module: module_name,
                entry: entry_name,
                status,
            },
            Err(err) => Outcome::classify(&err),
        };

        let stdout = self.store.data_mut().stdout();
        if let Err(e) = stdout.flush() {
            warn!("failed to flush program output: {}", e);
        }
        if let Err(e) = stdout.write_line(&outcome.to_string()) {
            warn!("failed to report outcome: {}", e);
        }
        self.transition(DriverState::Terminated);

        if outcome.reraises() {
            error!("run failed: {}", outcome);
        } else {
            info!("run succeeded: {}", outcome);
        }
        Ok(outcome)
    }
}

/// Load and run a program in one go: `extra` modules are linked in reverse order ahead of
/// `main`, against the given stub libraries.
pub fn run_program<S: AsRef<str>>(
    config: HostConfig,
    source: Box<dyn ModuleSource + Send>,
    sink: Box<dyn Write + Send>,
    libraries: &[StubLibrary],
    main: &str,
    extra: &[S],
) -> Result<Outcome, WasmlinkError> {
    let mut driver = Driver::new(config, source, sink)?;
    driver.load_stubs(libraries)?;
    driver.load_modules(extra)?;
    driver.load_main(main)?;
    driver.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_statuses() {
        let ok = Outcome::Returned {
            module: "m.wasm".into(),
            entry: "main".into(),
            status: 0,
        };
        assert!(ok.is_success());
        assert_eq!(ok.to_string(), "m.wasm::main() returned 0");

        let exit0 = Outcome::Terminated {
            status: 0,
            reason: "exit(0)".into(),
        };
        assert!(!exit0.reraises());
        assert_eq!(exit0.to_string(), "Program terminated with: exit(0)");

        let exit256 = Outcome::Terminated {
            status: 256,
            reason: "exit(256)".into(),
        };
        assert!(exit256.reraises());
        assert_eq!(exit256.exit_code(), 1);

        let nyi = Outcome::Unimplemented {
            what: "fopen".into(),
        };
        assert!(nyi.reraises());
        assert_eq!(nyi.exit_code(), 1);
        assert_eq!(nyi.to_string(), "Not yet implemented: fopen");
    }

    #[test]
    fn classification_is_by_type() {
        let err = Fault::nyi("divide by zero").into_error();
        assert_eq!(
            Outcome::classify(&err),
            Outcome::Unimplemented {
                what: "divide by zero".into()
            }
        );
        let err = anyhow::Error::new(Trap::IntegerDivisionByZero);
        assert_eq!(Outcome::classify(&err), Outcome::Trap(TrapKind::DivideByZero));
        let err = anyhow::anyhow!("divide by zero");
        assert!(matches!(Outcome::classify(&err), Outcome::Unknown { .. }));
        let err = anyhow::Error::new(MemoryError::NoActiveMemory);
        assert_eq!(
            Outcome::classify(&err),
            Outcome::Trap(TrapKind::MemoryOutOfBounds)
        );
    }
}
