//! The cooperative engine which runs the program body.
//!
//! The body runs on its own thread, but never at the same time as the driver.  A baton
//! (mutex + condvar) records whose turn it is, and each side blocks until the turn is handed
//! back.  The task gives up its turn only when it suspends on stdin, or when the body returns.
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, ThreadId},
};

use log::{debug, warn};

use crate::{HarnessError, HarnessOptions};

pub(crate) type Body = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// The lifecycle of the program body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, but not yet given control.  The first resume starts it.
    NotStarted,
    /// The body holds control, and the driver is waiting.
    Running,
    /// The body is waiting for stdin, and the driver holds control.
    Suspended,
    /// The body returned, failed or panicked.  Never changes again.
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Driver,
    Task,
}

enum Failure {
    Error(anyhow::Error),
    Panic(Box<dyn Any + Send + 'static>),
}

struct Baton {
    state: TaskState,
    turn: Turn,
    body: Option<Body>,
    task_thread: Option<ThreadId>,
    failure: Option<Failure>,
    abandoned: bool,
}

pub(crate) struct Engine {
    baton: Mutex<Baton>,
    handoff: Condvar,
    paused: AtomicBool,
    thread_name: String,
    stack_size: Option<usize>,
}

impl Engine {
    /// Creates an engine with no body.  `load` must be called before the first resume.
    pub fn new(options: &HarnessOptions) -> Arc<Self> {
        let baton = Baton {
            state: TaskState::NotStarted,
            turn: Turn::Driver,
            body: None,
            task_thread: None,
            failure: None,
            abandoned: false,
        };

        Arc::new(Self {
            baton: Mutex::new(baton),
            handoff: Condvar::new(),
            paused: AtomicBool::new(true),
            thread_name: options.thread_name.clone(),
            stack_size: options.stack_size,
        })
    }

    pub fn load(&self, body: Body) {
        let mut baton = self.lock();
        if baton.state == TaskState::NotStarted {
            baton.body = Some(body);
        }
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn exited(&self) -> bool {
        self.state() == TaskState::Exited
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Hands control to the task, and blocks until it suspends or exits.
    ///
    /// A no-op unless the task is NotStarted or Suspended.  A failure of the body is reported
    /// by the resume which observed it, and a panic is re-raised on the calling thread.
    pub fn resume(self: &Arc<Self>) -> Result<(), HarnessError> {
        let mut baton = self.lock();

        match baton.state {
            TaskState::Exited => {
                debug!("resume ignored, the task has exited");
                return Ok(());
            }
            TaskState::Running => {
                debug!("resume ignored, the task is already running");
                return Ok(());
            }
            TaskState::NotStarted => {
                let body = match baton.body.take() {
                    Some(body) => body,
                    None => return Ok(()),
                };

                baton.state = TaskState::Running;
                baton.turn = Turn::Task;

                match self.spawn(body) {
                    Ok(id) => {
                        debug!("task started on thread {:?}", id);
                        baton.task_thread = Some(id);
                    }
                    Err(e) => {
                        baton.state = TaskState::Exited;
                        baton.turn = Turn::Driver;
                        return Err(HarnessError::SpawnError(e));
                    }
                }
            }
            TaskState::Suspended => {
                debug!("task resumed");
                baton.state = TaskState::Running;
                baton.turn = Turn::Task;
                self.handoff.notify_all();
            }
        }

        let mut baton = self.wait_for(baton, Turn::Driver);
        let failure = baton.failure.take();
        drop(baton);

        match failure {
            None => Ok(()),
            Some(Failure::Error(e)) => Err(HarnessError::ProgramError(e)),
            Some(Failure::Panic(payload)) => panic::resume_unwind(payload),
        }
    }

    /// Resumes the task, unless the driver has paused the harness.
    pub fn resume_unless_paused(self: &Arc<Self>) -> Result<(), HarnessError> {
        if self.is_paused() {
            return Ok(());
        }

        self.resume()
    }

    /// Called by the task when stdin has nothing to read.  Hands control to the driver, and
    /// blocks until the next resume.
    ///
    /// Returns false without suspending when called off the task thread, or after the harness
    /// was dropped.  The caller should then fall back to an ordinary blocking read.
    pub fn suspend(&self) -> bool {
        let mut baton = self.lock();

        if baton.abandoned || baton.task_thread != Some(thread::current().id()) {
            return false;
        }

        debug!("task suspended, waiting for input");
        baton.state = TaskState::Suspended;
        baton.turn = Turn::Driver;
        self.handoff.notify_all();

        let _baton = self.wait_for(baton, Turn::Task);
        true
    }

    /// Releases a suspended task for the last time, without waiting for it.  The harness calls
    /// this on drop, after closing stdin.
    pub fn abandon(&self) {
        let mut baton = self.lock();
        baton.abandoned = true;

        match baton.state {
            TaskState::NotStarted => {
                baton.body = None;
            }
            TaskState::Suspended => {
                debug!("harness dropped, releasing the suspended task");
                baton.state = TaskState::Running;
                baton.turn = Turn::Task;
                self.handoff.notify_all();
            }
            TaskState::Running | TaskState::Exited => {}
        }
    }

    fn spawn(self: &Arc<Self>, body: Body) -> io::Result<ThreadId> {
        let engine = Arc::clone(self);

        let mut builder = thread::Builder::new().name(self.thread_name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(body));
            engine.finish(result);
        })?;

        Ok(handle.thread().id())
    }

    fn finish(&self, result: thread::Result<anyhow::Result<()>>) {
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(Failure::Error(e)),
            Err(payload) => Some(Failure::Panic(payload)),
        };

        let mut baton = self.lock();
        debug!("task exited");
        baton.state = TaskState::Exited;
        baton.turn = Turn::Driver;

        if baton.abandoned {
            match failure {
                Some(Failure::Error(e)) => warn!("detached task failed: {:#}", e),
                Some(Failure::Panic(payload)) => {
                    warn!("detached task panicked: {}", panic_message(payload.as_ref()))
                }
                None => {}
            }
        } else {
            baton.failure = failure;
        }

        self.handoff.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Baton> {
        self.baton.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for<'a>(&self, baton: MutexGuard<'a, Baton>, turn: Turn) -> MutexGuard<'a, Baton> {
        self.handoff
            .wait_while(baton, |baton| baton.turn != turn)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, TaskState};
    use crate::{HarnessError, HarnessOptions};
    use std::sync::{Arc, Mutex};

    fn engine<F>(body: F) -> Arc<Engine>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let engine = Engine::new(&HarnessOptions::default());
        engine.load(Box::new(body));
        engine
    }

    #[test]
    fn starts_on_first_resume() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let body_trace = trace.clone();
        let engine = engine(move || {
            body_trace.lock().unwrap().push("ran");
            Ok(())
        });

        assert_eq!(TaskState::NotStarted, engine.state());
        assert!(trace.lock().unwrap().is_empty());

        engine.resume().unwrap();

        assert_eq!(TaskState::Exited, engine.state());
        assert_eq!(vec!["ran"], *trace.lock().unwrap());
    }

    #[test]
    fn suspend_returns_control() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let body_trace = trace.clone();

        let engine = Engine::new(&HarnessOptions::default());
        let task_engine = engine.clone();
        engine.load(Box::new(move || {
            body_trace.lock().unwrap().push(1);
            assert!(task_engine.suspend());
            body_trace.lock().unwrap().push(2);
            Ok(())
        }));

        engine.resume().unwrap();
        assert_eq!(TaskState::Suspended, engine.state());
        assert_eq!(vec![1], *trace.lock().unwrap());

        engine.resume().unwrap();
        assert_eq!(TaskState::Exited, engine.state());
        assert_eq!(vec![1, 2], *trace.lock().unwrap());
    }

    #[test]
    fn suspend_off_task_thread_is_refused() {
        let engine = engine(|| Ok(()));
        assert!(!engine.suspend());
        assert_eq!(TaskState::NotStarted, engine.state());
    }

    #[test]
    fn resume_after_exit_is_noop() {
        let engine = engine(|| Ok(()));

        engine.resume().unwrap();
        engine.resume().unwrap();

        assert!(engine.exited());
    }

    #[test]
    fn body_error_surfaces_once() {
        let engine = engine(|| Err(anyhow::anyhow!("boom")));

        match engine.resume() {
            Err(HarnessError::ProgramError(e)) => assert_eq!("boom", e.to_string()),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(engine.exited());
        assert!(engine.resume().is_ok());
    }

    #[test]
    fn paused_engine_is_not_resumed() {
        let engine = engine(|| Ok(()));

        assert!(engine.is_paused());
        engine.resume_unless_paused().unwrap();
        assert_eq!(TaskState::NotStarted, engine.state());

        engine.set_paused(false);
        engine.resume_unless_paused().unwrap();
        assert_eq!(TaskState::Exited, engine.state());
    }

    #[test]
    fn abandon_drops_unstarted_body() {
        let marker = Arc::new(());
        let body_marker = marker.clone();
        let engine = engine(move || {
            drop(body_marker);
            Ok(())
        });

        assert_eq!(2, Arc::strong_count(&marker));
        engine.abandon();
        assert_eq!(1, Arc::strong_count(&marker));
    }
}
