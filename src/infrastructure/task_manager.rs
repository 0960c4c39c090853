use tokio::task::JoinHandle;

/// Tracks the background tasks that belong to one live connection (reader, heartbeat)
pub struct TaskManager {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskManager {
    /// Create a new empty task manager
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawn a task and track it under `label`
    pub fn spawn<F>(&mut self, label: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handles.retain(|(_, handle)| !handle.is_finished());
        self.handles.push((label, tokio::spawn(future)));
    }

    /// Number of tracked tasks still running
    pub fn running(&self) -> usize {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for (label, handle) in self.handles.drain(..) {
            if !handle.is_finished() {
                tracing::debug!("Aborting {} task", label);
            }
            handle.abort();
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort_all();
    }
}
