use ruledbg::config::DebugConfig;
use ruledbg::debugger::engine::{
    CallHandle, ContextHandle, Engine, EngineEvent, EngineListener, FactView,
};
use ruledbg::debugger::{DebugController, Error};
use ruledbg::protocol::transport::{EventChannel, EventReader};
use ruledbg::sim::{Function, SimEngine};
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const RULES: &str = "rules.clp";
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> DebugConfig {
    DebugConfig {
        command_port: 0,
        event_port: 0,
        poll_interval_ms: 50,
        ..Default::default()
    }
}

/// Connected loopback pair: server side event channel and a client side reader.
pub fn event_pair() -> (EventChannel, EventReader<BufReader<TcpStream>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    client.set_read_timeout(Some(TIMEOUT)).unwrap();
    let (server, _) = listener.accept().unwrap();
    (
        EventChannel::from_tcp(server).unwrap(),
        EventReader::from_tcp(client),
    )
}

/// Simulated engine which runs a one-shot hook before the next evaluation.
pub struct HookedEngine {
    pub sim: Arc<SimEngine>,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl HookedEngine {
    pub fn new(sim: Arc<SimEngine>) -> Self {
        Self {
            sim,
            hook: Mutex::default(),
        }
    }

    pub fn before_evaluation(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Engine for HookedEngine {
    fn evaluate(&self, expr: &str, ctx: &ContextHandle) -> anyhow::Result<String> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.sim.evaluate(expr, ctx)
    }

    fn fact(&self, id: u64) -> Option<FactView> {
        self.sim.fact(id)
    }

    fn current_activation(&self) -> Option<String> {
        self.sim.current_activation()
    }

    fn focus(&self) -> String {
        self.sim.focus()
    }

    fn agenda(&self, module: &str) -> anyhow::Result<Vec<String>> {
        self.sim.agenda(module)
    }
}

/// Records engine callbacks before passing them to the controller.
pub struct Recorder {
    controller: Arc<DebugController>,
    calls: Mutex<Vec<String>>,
}

impl EngineListener for Recorder {
    fn on_engine_event(
        &self,
        kind: EngineEvent,
        call: &CallHandle,
        ctx: &ContextHandle,
    ) -> Result<(), Error> {
        let kind_str = match kind {
            EngineEvent::Call => "call",
            EngineEvent::Return => "return",
        };
        self.calls
            .lock()
            .unwrap()
            .push(format!("{kind_str} {}", call.name()));
        self.controller.on_engine_event(kind, call, ctx)
    }
}

impl Recorder {
    /// All observed engine callbacks, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Controller with an attached event channel, driven directly without a command channel.
/// Thread that creates a session becomes the engine thread 0.
pub struct TestSession {
    pub controller: Arc<DebugController>,
    pub engine: Arc<SimEngine>,
    pub hooked: Arc<HookedEngine>,
    recorder: Arc<Recorder>,
    events: EventReader<BufReader<TcpStream>>,
}

impl TestSession {
    pub fn new() -> Self {
        let engine = Arc::new(SimEngine::new());
        let hooked = Arc::new(HookedEngine::new(engine.clone()));
        let controller = Arc::new(DebugController::new(hooked.clone(), test_config()));
        let (channel, events) = event_pair();
        controller.attach_event_channel(channel);

        let recorder = Arc::new(Recorder {
            controller: controller.clone(),
            calls: Mutex::default(),
        });
        engine.set_listener(recorder.clone());

        Self {
            controller,
            engine,
            hooked,
            recorder,
            events,
        }
    }

    pub fn next_event(&mut self) -> String {
        self.events
            .read_event()
            .expect("read event")
            .expect("event channel closed")
    }

    pub fn expect_event(&mut self, expected: &str) {
        assert_eq!(self.next_event(), expected);
    }

    /// Run a function on a new engine thread.
    pub fn spawn(&self, function: Function) -> JoinHandle<Result<(), Error>> {
        let engine = self.engine.clone();
        thread::spawn(move || engine.invoke(&function, None))
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.recorder.clone()
    }

    /// All observed engine callbacks, in order.
    pub fn calls(&self) -> Vec<String> {
        self.recorder.calls()
    }

    pub fn last_call(&self) -> Option<String> {
        self.calls().last().cloned()
    }
}

pub fn wait_until(what: &str, pred: impl Fn() -> bool) {
    let start = Instant::now();
    while !pred() {
        if start.elapsed() > TIMEOUT {
            panic!("timeout while waiting for {what}");
        }
        thread::sleep(Duration::from_millis(10));
    }
}
