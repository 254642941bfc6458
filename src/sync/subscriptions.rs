//! Remote subscription manager.
//!
//! One task owns both live subscriptions, their snapshots, the bounded
//! first-push waits and the active selection. Every event (push, error,
//! timeout, command) is applied in order and followed by a synchronous
//! merge, resolve and publish, so consumers never observe a partial update.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::reconcile::merge;
use super::selection::ActiveSelection;
use crate::models::{Identity, Origin, Project, StoreState, SyncErrorKind};
use crate::remote::{DocumentService, Feed, Push, Query};

/// Requests handled by the subscription loop.
#[derive(Debug, Clone)]
pub enum Command {
    /// Sign in as a new identity (or sign out with `None`).
    SetIdentity(Option<Identity>),
    /// Explicit selection by the user.
    Select(Option<String>),
    /// Select a just-created record before its echo arrives.
    SelectPending(String),
    /// Close both subscriptions and stop the loop.
    Shutdown,
}

/// Latest state of one subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub items: Vec<Project>,
    pub loaded: bool,
    pub error: Option<SyncErrorKind>,
}

struct Channel {
    origin: Origin,
    feed: Option<Feed>,
    snapshot: Snapshot,
    deadline: Option<Instant>,
}

impl Channel {
    fn idle(origin: Origin) -> Self {
        Self {
            origin,
            feed: None,
            snapshot: Snapshot::default(),
            deadline: None,
        }
    }

    fn reset(&mut self) {
        self.feed = None;
        self.snapshot = Snapshot::default();
        self.deadline = None;
    }

    fn apply(&mut self, push: Option<Push>) {
        self.deadline = None;
        self.snapshot.loaded = true;

        match push {
            Some(Push::Snapshot(docs)) => {
                tracing::debug!(origin = %self.origin, count = docs.len(), "Snapshot received");
                self.snapshot.items = docs
                    .into_iter()
                    .map(|doc| Project::from_record(doc.id, self.origin, doc.fields))
                    .collect();
                self.snapshot.error = None;
            }
            Some(Push::Failed(err)) => {
                tracing::warn!(origin = %self.origin, "Subscription error: {}", err);
                self.snapshot.error = Some(err.kind);
            }
            None => {
                tracing::warn!(origin = %self.origin, "Subscription closed by the service");
                self.feed = None;
                if self.snapshot.error.is_none() {
                    self.snapshot.error = Some(SyncErrorKind::Connection);
                }
            }
        }
    }

    fn expire(&mut self, waited: Duration) {
        tracing::warn!(
            origin = %self.origin,
            "No snapshot within {:?}; treating subscription as loaded",
            waited
        );
        self.deadline = None;
        self.snapshot.loaded = true;
    }
}

async fn next_push(feed: &mut Option<Feed>) -> Option<Push> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Owns the two subscriptions for the signed-in identity.
pub struct SubscriptionManager {
    service: Arc<dyn DocumentService>,
    first_push_timeout: Duration,
    identity: Option<Identity>,
    legacy: Channel,
    shared: Channel,
    selection: ActiveSelection,
    state: watch::Sender<StoreState>,
}

impl SubscriptionManager {
    pub fn new(
        service: Arc<dyn DocumentService>,
        first_push_timeout: Duration,
        state: watch::Sender<StoreState>,
    ) -> Self {
        Self {
            service,
            first_push_timeout,
            identity: None,
            legacy: Channel::idle(Origin::Legacy),
            shared: Channel::idle(Origin::Shared),
            selection: ActiveSelection::new(),
            state,
        }
    }

    /// Spawn the subscription loop. Dropping the returned sender stops it.
    pub fn spawn(
        service: Arc<dyn DocumentService>,
        first_push_timeout: Duration,
    ) -> (
        mpsc::UnboundedSender<Command>,
        watch::Receiver<StoreState>,
        JoinHandle<()>,
    ) {
        let (state_tx, state_rx) = watch::channel(StoreState::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let manager = Self::new(service, first_push_timeout, state_tx);
        let task = tokio::spawn(manager.run(command_rx));
        (command_tx, state_rx, task)
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                push = next_push(&mut self.legacy.feed) => self.legacy.apply(push),
                push = next_push(&mut self.shared.feed) => self.shared.apply(push),
                _ = wait_until(self.legacy.deadline) => self.legacy.expire(self.first_push_timeout),
                _ = wait_until(self.shared.deadline) => self.shared.expire(self.first_push_timeout),
            }
            self.publish();
        }

        self.teardown();
        tracing::debug!("Subscription loop stopped");
    }

    /// Apply one command. `Break` means the loop should stop.
    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::SetIdentity(identity) => {
                if identity == self.identity {
                    return ControlFlow::Continue(());
                }
                self.teardown();
                self.selection.clear();
                self.identity = identity.clone();
                if let Some(identity) = identity {
                    self.subscribe(&identity).await;
                }
            }
            Command::Select(id) => self.selection.select(id),
            Command::SelectPending(id) => self.selection.select_pending(id),
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn subscribe(&mut self, identity: &Identity) {
        tracing::info!(uid = %identity.uid, "Opening project subscriptions");
        let deadline = Instant::now() + self.first_push_timeout;

        let queries = [
            Query::OwnedBy(identity.uid.clone()),
            Query::MemberOf(identity.uid.clone()),
        ];
        for query in queries {
            let channel = match query.origin() {
                Origin::Shared => &mut self.shared,
                _ => &mut self.legacy,
            };
            match self.service.subscribe(query).await {
                Ok(feed) => {
                    channel.feed = Some(feed);
                    channel.deadline = Some(deadline);
                }
                Err(err) => channel.apply(Some(Push::Failed(err))),
            }
        }
    }

    /// Drop both feeds. Nothing from the old subscriptions is applied after this.
    fn teardown(&mut self) {
        if self.legacy.feed.is_some() || self.shared.feed.is_some() {
            tracing::info!("Closing project subscriptions");
        }
        self.legacy.reset();
        self.shared.reset();
    }

    fn loading(&self) -> bool {
        self.identity.is_some() && !(self.legacy.snapshot.loaded && self.shared.snapshot.loaded)
    }

    /// Permission outranks connection; either origin's error is reported.
    fn error(&self) -> Option<SyncErrorKind> {
        self.legacy.snapshot.error.max(self.shared.snapshot.error)
    }

    fn publish(&mut self) {
        let projects = merge(&self.legacy.snapshot.items, &self.shared.snapshot.items);
        self.selection.resolve(&projects);

        let next = StoreState {
            active_project: self.selection.active_project(&projects).cloned(),
            active_project_id: self.selection.active_id().map(str::to_string),
            loading: self.loading(),
            error: self.error(),
            projects,
        };

        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
