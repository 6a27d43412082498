use anyhow::{Result, anyhow};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::{
    sync::{mpsc, oneshot},
    task::{self, JoinHandle},
};

type Message<T> = (String, oneshot::Sender<Result<T>>);

/// Owns a model on a dedicated blocking thread and serves predictions over a channel.
///
/// The model is created on the worker thread, so it does not need to be `Send`.
/// Handles are cheap to clone and share the same worker.
#[derive(Debug)]
pub(crate) struct ModelWorker<T> {
    name: &'static str,
    sender: mpsc::Sender<Message<T>>,
}

impl<T> Clone for ModelWorker<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send + 'static> ModelWorker<T> {
    /// Spawns the worker and waits until the model is loaded.
    ///
    /// * `name` - worker name used in logs and errors.
    /// * `capacity` - number of requests that can wait for the worker.
    /// * `load` - builds the model, runs on the worker thread.
    /// * `predict` - scores one text with the loaded model.
    ///
    /// # Returns
    /// * Join handle of the worker thread and a handle to submit texts, or the load error.
    pub(crate) async fn spawn<M, L, P>(
        name: &'static str,
        capacity: usize,
        load: L,
        predict: P,
    ) -> Result<(JoinHandle<Result<()>>, Self)>
    where
        L: FnOnce() -> Result<M> + Send + 'static,
        P: Fn(&M, &str) -> Result<T> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (ready_sender, ready_receiver) = oneshot::channel();
        let handle =
            task::spawn_blocking(move || Self::run(name, load, predict, receiver, ready_sender));

        ready_receiver
            .await
            .map_err(|_| anyhow!("{name} worker exited before loading the model"))??;
        tracing::info!("{name} model loaded");

        Ok((handle, ModelWorker { name, sender }))
    }

    fn run<M, L, P>(
        name: &'static str,
        load: L,
        predict: P,
        mut receiver: mpsc::Receiver<Message<T>>,
        ready: oneshot::Sender<Result<()>>,
    ) -> Result<()>
    where
        L: FnOnce() -> Result<M>,
        P: Fn(&M, &str) -> Result<T>,
    {
        let model = match load() {
            Ok(model) => model,
            Err(e) => {
                let message = format!("{name} model failed to load: {e:#}");
                let _ = ready.send(Err(anyhow!(message.clone())));
                return Err(anyhow!(message));
            }
        };
        let _ = ready.send(Ok(()));

        while let Some((text, reply)) = receiver.blocking_recv() {
            let result = catch_unwind(AssertUnwindSafe(|| predict(&model, &text)))
                .unwrap_or_else(|panic| {
                    Err(anyhow!(
                        "{name} inference panicked: {}",
                        panic_message(&panic)
                    ))
                });
            if reply.send(result).is_err() {
                tracing::warn!("{name} caller dropped before receiving the result");
            }
        }

        tracing::info!("{name} worker stopped");
        Ok(())
    }

    /// Submits a text to the worker and waits for its prediction.
    pub(crate) async fn submit(&self, text: &str) -> Result<T> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send((text.to_owned(), reply))
            .await
            .map_err(|_| anyhow!("{} worker is not running", self.name))?;
        receiver
            .await
            .map_err(|_| anyhow!("{} worker dropped the request", self.name))?
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
