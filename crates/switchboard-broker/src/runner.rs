//! Launching services.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use switchboard_core::{Identity, Pid};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::pipe::ServicePipe;
use crate::service::{ServiceFactory, run_service};

/// Called once with the pid of the launched service, or `None` if it
/// could not be started.
pub type PidCallback = Box<dyn FnOnce(Option<Pid>) + Send + 'static>;

/// Called once when the launched service exits.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Keeps a launched service alive. Dropping it stops the service.
#[derive(Default)]
pub struct RunnerHandle {
    abort: Option<AbortHandle>,
}

impl RunnerHandle {
    /// A handle that stops the given task when dropped.
    #[must_use]
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    /// A handle that controls nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

impl fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("attached", &self.abort.is_some())
            .finish()
    }
}

/// What a runner hands back.
#[derive(Debug)]
pub struct LaunchedService {
    /// Pipe to the launched service.
    pub service: ServicePipe,
    /// Lifetime of the launch.
    pub handle: RunnerHandle,
}

/// Launches the service behind a package path.
pub trait NativeRunner: Send + Sync {
    /// Launch `identity` from `package_path`.
    ///
    /// `pid_callback` must be called exactly once; `completion_callback`
    /// exactly once when the service exits, including after a failed launch.
    fn start(
        &self,
        package_path: &Path,
        identity: &Identity,
        sandboxed: bool,
        pid_callback: PidCallback,
        completion_callback: CompletionCallback,
    ) -> LaunchedService;
}

/// Runs services as tasks in this process, keyed by package path.
#[derive(Default)]
pub struct InProcessRunner {
    factories: HashMap<PathBuf, ServiceFactory>,
}

impl InProcessRunner {
    /// A runner with no services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `package_path` with services built by `factory`.
    pub fn register(&mut self, package_path: impl Into<PathBuf>, factory: ServiceFactory) {
        self.factories.insert(package_path.into(), factory);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, package_path: impl Into<PathBuf>, factory: ServiceFactory) -> Self {
        self.register(package_path, factory);
        self
    }

    /// Number of registered package paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for InProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessRunner")
            .field("packages", &self.factories.len())
            .finish()
    }
}

impl NativeRunner for InProcessRunner {
    fn start(
        &self,
        package_path: &Path,
        identity: &Identity,
        sandboxed: bool,
        pid_callback: PidCallback,
        completion_callback: CompletionCallback,
    ) -> LaunchedService {
        let (service, endpoint) = ServicePipe::channel();

        let Some(factory) = self.factories.get(package_path) else {
            warn!(
                identity = %identity,
                package = %package_path.display(),
                "No in-process service registered for package"
            );
            drop(endpoint);
            pid_callback(None);
            completion_callback();
            return LaunchedService {
                service,
                handle: RunnerHandle::detached(),
            };
        };

        if sandboxed {
            debug!(identity = %identity, "Sandboxing not applied to in-process services");
        }

        info!(identity = %identity, package = %package_path.display(), "Launching in-process service");
        let task = tokio::spawn(run_service(endpoint, factory(identity)));
        let handle = RunnerHandle::new(task.abort_handle());
        pid_callback(Some(std::process::id()));

        let identity = identity.clone();
        tokio::spawn(async move {
            if let Err(err) = task.await
                && err.is_panic()
            {
                warn!(identity = %identity, "In-process service panicked");
            }
            completion_callback();
        });

        LaunchedService { service, handle }
    }
}
