//! Run a routed statement on every physical target and merge the results.
//!
//! Targets on the same physical database share that database's connection
//! and run one after another. Different databases run concurrently or one
//! after another, depending on configuration.

pub mod connections;
pub mod merge;

use indexmap::IndexMap;
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub use connections::Connections;
pub use merge::{merge, Merge};

use super::{Connection, Error, ExecuteKind, Executed, MergedResult, Request};
use crate::config::Fanout;
use crate::frontend::router::{RouteSet, SqlRouteInfo};

#[derive(Debug, Clone, Copy, Default)]
pub struct FanOut {
    mode: Fanout,
}

impl FanOut {
    pub fn new(mode: Fanout) -> Self {
        Self { mode }
    }

    /// Execute every route and merge the results in route order.
    ///
    /// The first failing target cancels the others and no results are
    /// returned. Cancelling `cancel` stops every target still running.
    /// Connections are always given back to `connections`.
    pub async fn execute(
        &self,
        routes: &RouteSet,
        kind: &ExecuteKind,
        connections: &mut Connections,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error> {
        let mut groups = Vec::new();

        for (database, targets) in group(routes, kind) {
            match connections.checkout(&database).await {
                Ok(connection) => groups.push(Group {
                    connection,
                    targets,
                }),
                Err(err) => {
                    for group in groups {
                        connections.checkin(group.connection).await;
                    }
                    error!("{} failed: {}", database, err);
                    return Err(Error::target(database, err));
                }
            }
        }

        debug!(
            "fanning out to {} targets on {} databases [{:?}]",
            routes.len(),
            groups.len(),
            self.mode,
        );

        let token = cancel.child_token();
        let finished = match self.mode {
            Fanout::Parallel => Self::parallel(groups, &token).await,
            Fanout::Sequential => Self::sequential(groups, &token).await,
        };

        let mut results = Vec::new();
        let mut failure: Option<Error> = None;

        for done in finished {
            match done {
                Ok(done) => {
                    connections.checkin(done.connection).await;
                    match done.result {
                        Ok(executed) => results.extend(executed),
                        Err(err) => failure = Some(first_failure(failure, err)),
                    }
                }
                Err(err) => failure = Some(first_failure(failure, err)),
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        results.sort_by_key(|(position, _)| *position);
        merge(kind, results.into_iter().map(|(_, executed)| executed))
    }

    async fn parallel(groups: Vec<Group>, token: &CancellationToken) -> Vec<Result<Done, Error>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut running = Running {
            tasks: JoinSet::new(),
            done: receiver,
            token: token.clone(),
        };

        for group in groups {
            let sender = sender.clone();
            let token = token.clone();
            running.tasks.spawn(async move {
                let done = group.run(token).await;
                if let Err(SendError(done)) = sender.send(done) {
                    close(done.connection).await;
                }
            });
        }
        drop(sender);

        let mut finished = Vec::new();
        while let Some(joined) = running.tasks.join_next().await {
            if let Err(err) = joined {
                token.cancel();
                finished.push(Err(Error::Join(err)));
            }
        }
        while let Ok(done) = running.done.try_recv() {
            finished.push(Ok(done));
        }

        // Completion order isn't deterministic.
        finished.sort_by_key(|done| match done {
            Ok(done) => done.position,
            Err(_) => usize::MAX,
        });
        finished
    }

    async fn sequential(groups: Vec<Group>, token: &CancellationToken) -> Vec<Result<Done, Error>> {
        let mut done = Vec::new();
        for group in groups {
            let group = if token.is_cancelled() {
                group.skip()
            } else {
                group.run(token.clone()).await
            };
            done.push(Ok(group));
        }
        done
    }
}

/// Statement for one target.
#[derive(Debug)]
struct Target {
    position: usize,
    name: String,
    request: Request,
}

impl Target {
    fn new(position: usize, route: &SqlRouteInfo, kind: &ExecuteKind) -> Self {
        let name = match route.table {
            Some(ref table) => format!("{}/{}", route.database, table),
            None => route.database.clone(),
        };

        Self {
            position,
            name,
            request: Request::new(&route.sql, &route.params, kind),
        }
    }
}

/// Targets by physical database, in route order.
fn group(routes: &RouteSet, kind: &ExecuteKind) -> IndexMap<String, Vec<Target>> {
    let mut groups: IndexMap<String, Vec<Target>> = IndexMap::new();
    for (position, route) in routes.iter().enumerate() {
        groups
            .entry(route.database.clone())
            .or_default()
            .push(Target::new(position, route, kind));
    }
    groups
}

/// Targets sharing one connection.
#[derive(Debug)]
struct Group {
    connection: Connection,
    targets: Vec<Target>,
}

/// Group after execution, with its connection to give back.
#[derive(Debug)]
struct Done {
    position: usize,
    connection: Connection,
    result: Result<Vec<(usize, Executed)>, Error>,
}

impl Group {
    fn position(&self) -> usize {
        self.targets.first().map(|t| t.position).unwrap_or_default()
    }

    async fn run(mut self, token: CancellationToken) -> Done {
        let position = self.position();
        let targets = std::mem::take(&mut self.targets);
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let executed = select! {
                executed = self.connection.execute(&target.request) => Some(executed),
                _ = token.cancelled() => None,
            };

            let result = match executed {
                Some(result) => result,
                None => {
                    if let Err(err) = self.connection.cancel().await {
                        error!("error cancelling {}: {}", target.name, err);
                    }
                    Err(Error::Cancelled)
                }
            };

            match result {
                Ok(executed) => results.push((target.position, executed)),
                Err(Error::Cancelled) => {
                    debug!("{} cancelled", target.name);
                    return self.done(position, Err(Error::Cancelled));
                }
                Err(err) => {
                    error!("{} failed: {}", target.name, err);
                    token.cancel();
                    let err = Error::target(&target.name, err);
                    return self.done(position, Err(err));
                }
            }
        }

        self.done(position, Ok(results))
    }

    /// Give the connection back without running anything.
    fn skip(self) -> Done {
        let position = self.position();
        self.done(position, Err(Error::Cancelled))
    }

    fn done(self, position: usize, result: Result<Vec<(usize, Executed)>, Error>) -> Done {
        Done {
            position,
            connection: self.connection,
            result,
        }
    }
}

/// Tasks of a parallel fan-out.
///
/// If the caller stops waiting, the tasks are cancelled but not aborted:
/// each one closes its connection once it stops.
struct Running {
    tasks: JoinSet<()>,
    done: UnboundedReceiver<Done>,
    token: CancellationToken,
}

impl Drop for Running {
    fn drop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        debug!("fan-out dropped with {} targets running", self.tasks.len());
        self.token.cancel();
        self.tasks.detach_all();

        // Tasks finishing from now on close their own connections.
        self.done.close();
        while let Ok(done) = self.done.try_recv() {
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(close(done.connection));
            }
        }
    }
}

/// Close a connection nobody is waiting for.
async fn close(mut connection: Connection) {
    debug!("closing {}", connection.index());
    if let Err(err) = connection.close().await {
        error!("error closing {}: {}", connection.index(), err);
    }
}

/// Keep the first real failure over cancellations it caused.
fn first_failure(current: Option<Error>, err: Error) -> Error {
    match current {
        Some(Error::Cancelled) | None => err,
        Some(current) => current,
    }
}
