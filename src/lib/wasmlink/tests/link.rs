use wasmlink::{
    abi::{Args, Ret},
    dl::{self, DlFlags},
    Driver, DriverState, Fault, Host, HostConfig, InMemorySource, Outcome, SharedSink,
    StubLibrary, TrapKind, WasmlinkErrorKind,
};
use wasmtime::Caller;

fn one(_: &mut Caller<'_, Host>, _: Args<'_>) -> anyhow::Result<Ret> {
    Ok(Ret::I32(1))
}

fn two(_: &mut Caller<'_, Host>, _: Args<'_>) -> anyhow::Result<Ret> {
    Ok(Ret::I32(2))
}

fn exit(_: &mut Caller<'_, Host>, args: Args<'_>) -> anyhow::Result<Ret> {
    let status = args.i32(0);
    Err(Fault::terminate(status, format!("exit({})", status)).into_error())
}

fn libraries() -> Vec<StubLibrary> {
    vec![
        StubLibrary::new("first").func("pick", one).nyi("fopen"),
        StubLibrary::new("second").func("pick", two).func("exit", exit),
    ]
}

fn driver(source: InMemorySource) -> (Driver, SharedSink) {
    let sink = SharedSink::new();
    let config = HostConfig::default().with_pages(2);
    let mut driver = Driver::new(config, Box::new(source), Box::new(sink.clone())).unwrap();
    driver.load_stubs(&libraries()).unwrap();
    (driver, sink)
}

fn run(source: InMemorySource, extra: &[&str]) -> (Outcome, SharedSink) {
    let (mut driver, sink) = driver(source);
    driver.load_modules(extra).unwrap();
    driver.load_main("main.wasm").unwrap();
    let outcome = driver.run().unwrap();
    assert_eq!(driver.state(), DriverState::Terminated);
    (outcome, sink)
}

const CALL_PICK: &str = r#"
(module
  (import "env" "pick" (func $pick (result i32)))
  (func (export "main") (result i32) (call $pick)))
"#;

#[test]
fn last_stub_library_wins() {
    let src = InMemorySource::new().with("main.wasm", CALL_PICK);
    let (outcome, sink) = run(src, &[]);
    assert_eq!(outcome.exit_status(), 2);
    assert!(outcome.reraises());
    assert_eq!(sink.text(), "main.wasm::main() returned 2\n");
}

#[test]
fn module_exports_override_stubs() {
    let lib = r#"(module (func (export "pick") (result i32) (i32.const 0)))"#;
    let src = InMemorySource::new()
        .with("main.wasm", CALL_PICK)
        .with("lib.wasm", lib);
    let (outcome, _) = run(src, &["lib.wasm"]);
    assert!(outcome.is_success());
}

#[test]
fn first_listed_module_wins_among_modules() {
    let x = r#"(module (func (export "pick") (result i32) (i32.const 7)))"#;
    let y = r#"(module (func (export "pick") (result i32) (i32.const 9)))"#;
    let src = InMemorySource::new()
        .with("main.wasm", CALL_PICK)
        .with("x.wasm", x)
        .with("y.wasm", y);
    let (outcome, sink) = run(src, &["x.wasm", "y.wasm"]);
    assert_eq!(outcome.exit_status(), 7);
    assert_eq!(sink.text(), "main.wasm::main() returned 7\n");
}

#[test]
fn extra_modules_bind_in_reverse() {
    let a = r#"
(module
  (import "env" "from_b" (func $b (result i32)))
  (func (export "from_a") (result i32) (i32.add (call $b) (i32.const 100))))"#;
    let b = r#"
(module
  (import "env" "from_c" (func $c (result i32)))
  (func (export "from_b") (result i32) (i32.add (call $c) (i32.const 10))))"#;
    let c = r#"(module (func (export "from_c") (result i32) (i32.const 1)))"#;
    let main = r#"
(module
  (import "env" "from_a" (func $a (result i32)))
  (func (export "main") (result i32) (call $a)))"#;
    let src = InMemorySource::new()
        .with("a.wasm", a)
        .with("b.wasm", b)
        .with("c.wasm", c)
        .with("main.wasm", main);

    let (mut driver, _) = driver(src);
    driver.load_modules(&["a.wasm", "b.wasm", "c.wasm"]).unwrap();
    let order: Vec<&str> = driver.modules().iter().map(|m| m.name()).collect();
    assert_eq!(order, ["c.wasm", "b.wasm", "a.wasm"]);
    driver.load_main("main.wasm").unwrap();
    assert_eq!(driver.run().unwrap().exit_status(), 111);
}

#[test]
fn main_exports_are_not_merged() {
    let main = r#"(module (func (export "main") (result i32) (i32.const 0)))"#;
    let src = InMemorySource::new().with("main.wasm", main);
    let (mut driver, _) = driver(src);
    let before = driver.host().env().len();
    driver.load_main("main.wasm").unwrap();
    assert_eq!(driver.host().env().len(), before);
    assert!(!driver.host().env().contains("main"));
}

#[test]
fn unresolved_imports_are_reported_together() {
    let main = r#"
(module
  (import "env" "nope" (func))
  (import "env" "pick" (func (result i32)))
  (import "env" "also_nope" (func))
  (func (export "main") (result i32) (i32.const 0)))"#;
    let src = InMemorySource::new().with("main.wasm", main);
    let (mut driver, _) = driver(src);
    let err = driver.load_main("main.wasm").unwrap_err();
    assert!(err.is_load_failure());
    let fields: Vec<_> = err
        .related
        .iter()
        .map(|e| match &e.kind {
            WasmlinkErrorKind::UnresolvedImport { field, .. } => field.as_str(),
            other => panic!("unexpected error {:?}", other),
        })
        .collect();
    assert_eq!(fields, ["nope", "also_nope"]);
}

#[test]
fn missing_module_is_a_load_failure() {
    let (mut driver, _) = driver(InMemorySource::new());
    let err = driver.load_modules(&["gone.wasm"]).unwrap_err();
    assert!(err.is_load_failure());
    assert!(err
        .find(|k| matches!(k, WasmlinkErrorKind::ModuleNotFound { .. }))
        .is_some());
}

#[test]
fn exported_memory_becomes_active() {
    let lib = r#"
(module
  (memory (export "memory") 3)
  (data (i32.const 16) "hello"))"#;
    let src = InMemorySource::new().with("lib.wasm", lib);
    let (mut driver, _) = driver(src);
    driver.load_modules(&["lib.wasm"]).unwrap();

    let module = &driver.modules()[0];
    let exported = module.exported_memory().unwrap();
    let store = driver.store();
    let active = driver.host().memory().active().unwrap();
    assert_eq!(driver.host().memory().handle(), module.memory_handle());
    assert_eq!(driver.host().memory().owner(), Some("lib.wasm"));
    assert_eq!(active.data_size(store), 3 * 65536);
    assert_eq!(active.data(store), exported.data(store));
    assert_eq!(&active.data(store)[16..21], b"hello");
}

#[test]
fn memory_imports_get_the_active_memory() {
    let main = r#"
(module
  (import "env" "memory" (memory 1))
  (func (export "main") (result i32)
    (i32.store8 (i32.const 8) (i32.const 42))
    (i32.const 0)))"#;
    let src = InMemorySource::new().with("main.wasm", main);
    let (mut driver, _) = driver(src);
    driver.load_main("main.wasm").unwrap();
    assert!(driver.run().unwrap().is_success());
    let memory = driver.host().memory().active().unwrap();
    assert_eq!(memory.data(driver.store())[8], 42);
}

#[test]
fn entry_point_is_checked_before_running() {
    let none = r#"(module (func (export "start") (result i32) (i32.const 0)))"#;
    let wrong = r#"(module (func (export "main") (param i32) (result i32) (local.get 0)))"#;
    let src = InMemorySource::new()
        .with("none.wasm", none)
        .with("wrong.wasm", wrong);

    let (mut d, _) = driver(src.clone());
    assert!(matches!(
        d.load_main("none.wasm").unwrap_err().kind,
        WasmlinkErrorKind::MissingEntry { .. }
    ));
    let (mut d, _) = driver(src);
    assert!(matches!(
        d.load_main("wrong.wasm").unwrap_err().kind,
        WasmlinkErrorKind::BadEntrySignature { .. }
    ));
    assert!(matches!(
        d.run().unwrap_err().kind,
        WasmlinkErrorKind::InvalidState { .. }
    ));
}

#[test]
fn exit_statuses() {
    let exit_with = |status: i32| {
        format!(
            r#"(module
  (import "env" "exit" (func $exit (param i32)))
  (func (export "main") (result i32) (call $exit (i32.const {})) (i32.const 9)))"#,
            status
        )
    };
    let (outcome, sink) = run(InMemorySource::new().with("main.wasm", exit_with(0)), &[]);
    assert!(outcome.is_success());
    assert_eq!(sink.text(), "Program terminated with: exit(0)\n");

    let (outcome, _) = run(InMemorySource::new().with("main.wasm", exit_with(3)), &[]);
    assert!(outcome.reraises());
    assert_eq!(outcome.exit_code(), 3);
}

#[test]
fn traps_are_not_unimplemented_features() {
    let div = r#"
(module
  (func (export "main") (result i32) (i32.div_s (i32.const 1) (i32.const 0))))"#;
    let (outcome, sink) = run(InMemorySource::new().with("main.wasm", div), &[]);
    assert_eq!(outcome, Outcome::Trap(TrapKind::DivideByZero));
    assert_eq!(sink.text(), "Runtime trap: divide by zero\n");

    let nyi = r#"
(module
  (import "env" "fopen" (func $fopen (param i32 i32) (result i32)))
  (func (export "main") (result i32) (call $fopen (i32.const 0) (i32.const 0))))"#;
    let (outcome, sink) = run(InMemorySource::new().with("main.wasm", nyi), &[]);
    assert_eq!(
        outcome,
        Outcome::Unimplemented {
            what: "fopen".into()
        }
    );
    assert_eq!(sink.text(), "Not yet implemented: fopen\n");
}

const DYLIB: &str = r#"
(module
  (import "env" "pick" (func $pick (result i32)))
  (global (export "answer") i32 (i32.const 42))
  (func (export "f") (result i32) (call $pick)))
"#;

#[test]
fn dlopen_counts_references() {
    let src = InMemorySource::new().with("dy.wasm", DYLIB);
    let (mut driver, _) = driver(src);
    let store = driver.store_mut();

    let h1 = dl::open(&mut *store, "dy.wasm", DlFlags::NOW).unwrap();
    let h2 = dl::open(&mut *store, "dy.wasm", DlFlags::LAZY).unwrap();
    assert_eq!(h1, h2);
    assert_eq!(h1.raw(), 1);
    let libs = store.data_mut().libs_mut();
    assert_eq!(libs.refcount(h1), Some(2));

    assert_eq!(libs.close(h1.raw()).unwrap(), 1);
    assert_eq!(libs.close(h1.raw()).unwrap(), 0);
    assert!(libs.is_empty());
    assert!(matches!(
        libs.close(h1.raw()).unwrap_err().kind,
        WasmlinkErrorKind::InvalidHandle { handle: 1 }
    ));

    let h3 = dl::open(&mut *store, "dy.wasm", DlFlags::NOW).unwrap();
    assert_eq!(h3.raw(), 2);
}

#[test]
fn dlsym_lookups_leave_state_alone() {
    let src = InMemorySource::new().with("dy.wasm", DYLIB);
    let (mut driver, _) = driver(src);
    let env_len = driver.host().env().len();
    let store = driver.store_mut();
    let handle = dl::open(&mut *store, "dy.wasm", DlFlags::NOW).unwrap();

    let libs = store.data().libs();
    assert!(libs.lookup(handle.raw(), "f").unwrap().into_func().is_some());
    assert!(libs.lookup(handle.raw(), "answer").unwrap().into_global().is_some());
    assert!(matches!(
        libs.lookup(handle.raw(), "missing").unwrap_err().kind,
        WasmlinkErrorKind::SymbolNotFound { .. }
    ));
    assert!(matches!(
        libs.lookup(handle.raw(), "").unwrap_err().kind,
        WasmlinkErrorKind::InvalidSymbol
    ));
    assert_eq!(libs.refcount(handle), Some(1));
    assert_eq!(driver.host().env().len(), env_len);
    assert!(!driver.host().env().contains("f"));
}

#[test]
fn dlopen_rejects_unsupported_flags() {
    let src = InMemorySource::new().with("dy.wasm", DYLIB);
    let (mut driver, _) = driver(src);
    let flags = DlFlags::NOW | DlFlags::GLOBAL;
    let err = dl::open(driver.store_mut(), "dy.wasm", flags).unwrap_err();
    assert_eq!(err.kind, WasmlinkErrorKind::UnsupportedFlag { flags: 258 });
    let err = dl::open(driver.store_mut(), "other.wasm", DlFlags::NOW).unwrap_err();
    assert!(err.is_load_failure());
    assert!(driver.host().libs().is_empty());
}
