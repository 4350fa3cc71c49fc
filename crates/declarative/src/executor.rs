//! Change executor - dispatches changes to handlers and collects results
//!
//! Changes are grouped by [`ChangeType`]; each group is handed to the single
//! handler claiming that type. Groups run concurrently on a rayon pool and are
//! joined before [`ChangeExecutor::execute`] returns, so a call is synchronous
//! for the caller. A failure, or a panic, in one handler only fails the changes
//! of that handler's group.

use crate::change::{Change, ChangeError, ChangeResponse, ChangeType};
use crate::error::{Error, Result};
use crate::handler::ChangeHandler;
use crate::result::ChangeResult;
use rayon::prelude::*;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

/// Options for executing changes
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Only describe changes, never apply them
    pub dry_run: bool,
    /// Number of worker threads, `None` for the global rayon pool
    pub jobs: Option<usize>,
}

impl ExecutorOptions {
    pub fn dry_run(dry_run: bool) -> Self {
        Self {
            dry_run,
            jobs: None,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs.max(1));
        self
    }
}

/// Executes a set of changes with a set of handlers
#[derive(Debug)]
pub struct ChangeExecutor<C> {
    changes: Vec<C>,
    options: ExecutorOptions,
}

struct Group<C> {
    change_type: ChangeType,
    indices: Vec<usize>,
    changes: Vec<C>,
}

type HandlerMap<'h, C> = HashMap<ChangeType, &'h dyn ChangeHandler<C>>;

impl<C: Change> ChangeExecutor<C> {
    pub fn new(changes: Vec<C>, options: ExecutorOptions) -> Self {
        Self { changes, options }
    }

    pub fn changes(&self) -> &[C] {
        &self.changes
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Execute the changes
    ///
    /// Fails before touching any change when two handlers claim the same
    /// change type. Changes whose type has no handler are left out of the
    /// results. Results are returned in the order of the changes.
    pub fn execute(self, handlers: &[Box<dyn ChangeHandler<C>>]) -> Result<Vec<ChangeResult<C>>> {
        let by_type = handlers_by_type(handlers)?;

        let total = self.changes.len();
        let changes: Vec<C> = self
            .changes
            .into_iter()
            .filter(|c| {
                let supported = by_type.contains_key(&c.operation());
                if !supported {
                    log::debug!("No handler for {} change {}, skipping", c.operation(), c.id());
                }
                supported
            })
            .collect();
        log::info!(
            "Executing {} of {} changes{}",
            changes.len(),
            total,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        if self.options.dry_run {
            return Ok(changes
                .into_iter()
                .map(|change| describe_only(&by_type, change))
                .collect());
        }

        let groups = group_by_type(changes);
        let run = || -> Vec<(usize, ChangeResult<C>)> {
            groups
                .into_par_iter()
                .flat_map_iter(|group| {
                    let handler = by_type[&group.change_type];
                    run_group(handler, group)
                })
                .collect()
        };

        let mut results = match self.options.jobs {
            Some(jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()?
                .install(run),
            None => run(),
        };

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, result)| result).collect())
    }
}

fn handlers_by_type<C: Change>(handlers: &[Box<dyn ChangeHandler<C>>]) -> Result<HandlerMap<'_, C>> {
    let mut by_type: HandlerMap<'_, C> = HashMap::new();
    for handler in handlers {
        for change_type in handler.supported_change_types() {
            if let Some(first) = by_type.insert(*change_type, handler.as_ref()) {
                return Err(Error::DuplicateHandler {
                    change_type: *change_type,
                    first: first.name().to_string(),
                    second: handler.name().to_string(),
                });
            }
        }
    }
    Ok(by_type)
}

fn describe_only<C: Change>(by_type: &HandlerMap<'_, C>, change: C) -> ChangeResult<C> {
    let description = by_type[&change.operation()].describe(&change);
    if change.operation() == ChangeType::None {
        ChangeResult::ok(change, description)
    } else {
        ChangeResult::changed(change, description)
    }
}

fn group_by_type<C: Change>(changes: Vec<C>) -> Vec<Group<C>> {
    let mut groups: BTreeMap<ChangeType, Group<C>> = BTreeMap::new();
    for (idx, change) in changes.into_iter().enumerate() {
        let change_type = change.operation();
        let group = groups.entry(change_type).or_insert_with(|| Group {
            change_type,
            indices: Vec::new(),
            changes: Vec::new(),
        });
        group.indices.push(idx);
        group.changes.push(change);
    }
    groups.into_values().collect()
}

fn run_group<C: Change>(handler: &dyn ChangeHandler<C>, group: Group<C>) -> Vec<(usize, ChangeResult<C>)> {
    log::debug!(
        "Applying {} {} change(s) with {}",
        group.changes.len(),
        group.change_type,
        handler.name()
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.apply(&group.changes)));
    let (mut responses, group_error) = match outcome {
        Ok(responses) => (responses.into_iter().map(Some).collect::<Vec<_>>(), None),
        Err(payload) => {
            let message = format!("handler '{}' panicked: {}", handler.name(), panic_message(payload.as_ref()));
            log::error!("{message}");
            (Vec::new(), Some(ChangeError::new(message)))
        }
    };

    group
        .indices
        .into_iter()
        .zip(group.changes)
        .enumerate()
        .map(|(position, (idx, change))| {
            let description = handler.describe(&change);
            let result = if change.operation() == ChangeType::None {
                ChangeResult::ok(change, description)
            } else if let Some(error) = &group_error {
                ChangeResult::failed(change, description, vec![error.clone()])
            } else {
                match take_response(&mut responses, position, &change.id()) {
                    Some(response) => {
                        let errors: Vec<ChangeError> = response
                            .into_metadata()
                            .iter()
                            .filter_map(|m| m.error().cloned())
                            .collect();
                        if errors.is_empty() {
                            ChangeResult::changed(change, description)
                        } else {
                            ChangeResult::failed(change, description, errors)
                        }
                    }
                    None => {
                        let error = ChangeError::new(format!(
                            "handler '{}' reported no outcome for {}",
                            handler.name(),
                            change.id()
                        ));
                        ChangeResult::failed(change, description, vec![error])
                    }
                }
            };
            (idx, result)
        })
        .collect()
}

/// Take the response of the change at `position`
///
/// Responses pair with changes by position. A handler answering out of order
/// falls back to the first unclaimed response carrying the same id, so each
/// response is claimed by at most one change.
fn take_response(responses: &mut [Option<ChangeResponse>], position: usize, id: &str) -> Option<ChangeResponse> {
    if let Some(slot) = responses.get_mut(position)
        && slot.as_ref().is_some_and(|r| r.change_id() == id)
    {
        return slot.take();
    }
    responses
        .iter_mut()
        .find(|slot| slot.as_ref().is_some_and(|r| r.change_id() == id))
        .and_then(Option::take)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeMetadata;
    use crate::result::ChangeStatus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq)]
    struct TestChange {
        id: String,
        operation: ChangeType,
    }

    fn change(id: &str, operation: ChangeType) -> TestChange {
        TestChange {
            id: id.to_string(),
            operation,
        }
    }

    impl Change for TestChange {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn operation(&self) -> ChangeType {
            self.operation
        }
    }

    /// Handler failing the changes whose id is listed in `fail`
    struct RecordingHandler {
        types: Vec<ChangeType>,
        fail: Vec<&'static str>,
        applied: Arc<AtomicUsize>,
    }

    impl RecordingHandler {
        fn new(types: &[ChangeType]) -> Self {
            Self {
                types: types.to_vec(),
                fail: Vec::new(),
                applied: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ChangeHandler<TestChange> for RecordingHandler {
        fn supported_change_types(&self) -> &[ChangeType] {
            &self.types
        }

        fn apply(&self, changes: &[TestChange]) -> Vec<ChangeResponse> {
            changes
                .iter()
                .map(|c| {
                    self.applied.fetch_add(1, Ordering::SeqCst);
                    let result = if self.fail.contains(&c.id.as_str()) {
                        Err(anyhow::anyhow!("cannot apply {}", c.id))
                    } else {
                        Ok(())
                    };
                    ChangeResponse::new(c, ChangeMetadata::from_result(result))
                })
                .collect()
        }

        fn describe(&self, change: &TestChange) -> String {
            format!("{} {}", change.operation, change.id)
        }
    }

    struct PanickingHandler(ChangeType);

    impl ChangeHandler<TestChange> for PanickingHandler {
        fn supported_change_types(&self) -> &[ChangeType] {
            std::slice::from_ref(&self.0)
        }

        fn apply(&self, _changes: &[TestChange]) -> Vec<ChangeResponse> {
            panic!("apply must not be called");
        }

        fn describe(&self, change: &TestChange) -> String {
            format!("would {} {}", change.operation, change.id)
        }
    }

    fn statuses<C>(results: &[ChangeResult<C>]) -> Vec<ChangeStatus> {
        results.iter().map(ChangeResult::status).collect()
    }

    #[test]
    fn test_duplicate_handlers_fail_before_applying() {
        let first = RecordingHandler::new(&[ChangeType::Add]);
        let applied = Arc::clone(&first.applied);
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![
            Box::new(first),
            Box::new(RecordingHandler::new(&[ChangeType::Add, ChangeType::Delete])),
        ];

        let executor = ChangeExecutor::new(vec![change("a", ChangeType::Add)], ExecutorOptions::default());
        let err = executor.execute(&handlers).unwrap_err();

        assert!(matches!(
            err,
            Error::DuplicateHandler {
                change_type: ChangeType::Add,
                ..
            }
        ));
        assert!(err.is_configuration());
        assert_eq!(applied.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_is_isolated_per_change() {
        let mut handler = RecordingHandler::new(&[ChangeType::Update]);
        handler.fail = vec!["b"];
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![Box::new(handler)];

        let changes = vec![
            change("a", ChangeType::Update),
            change("b", ChangeType::Update),
            change("c", ChangeType::Update),
        ];
        let results = ChangeExecutor::new(changes, ExecutorOptions::default())
            .execute(&handlers)
            .unwrap();

        assert_eq!(
            statuses(&results),
            [ChangeStatus::Changed, ChangeStatus::Failed, ChangeStatus::Changed]
        );
        assert_eq!(results[1].errors()[0].message, "cannot apply b");
        assert_eq!(results[1].description(), "UPDATE b");
    }

    #[test]
    fn test_dry_run_never_applies() {
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![
            Box::new(PanickingHandler(ChangeType::Add)),
            Box::new(PanickingHandler(ChangeType::None)),
        ];
        let changes = vec![change("a", ChangeType::Add), change("b", ChangeType::None)];

        let results = ChangeExecutor::new(changes, ExecutorOptions::dry_run(true))
            .execute(&handlers)
            .unwrap();

        assert_eq!(statuses(&results), [ChangeStatus::Changed, ChangeStatus::Ok]);
        assert_eq!(results[0].description(), "would ADD a");
    }

    #[test]
    fn test_unmapped_change_types_are_skipped() {
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> =
            vec![Box::new(RecordingHandler::new(&[ChangeType::Add]))];
        let changes = vec![
            change("a", ChangeType::Add),
            change("b", ChangeType::Delete),
            change("c", ChangeType::Ignore),
        ];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default())
            .execute(&handlers)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change().id, "a");
    }

    #[test]
    fn test_none_changes_are_ok_and_order_is_preserved() {
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![
            Box::new(RecordingHandler::new(&[ChangeType::Add])),
            Box::new(RecordingHandler::new(&[ChangeType::Delete])),
            Box::new(crate::handler::NoopChangeHandler),
        ];
        let changes = vec![
            change("d", ChangeType::Delete),
            change("n", ChangeType::None),
            change("a", ChangeType::Add),
            change("e", ChangeType::Delete),
        ];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default().with_jobs(2))
            .execute(&handlers)
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.change().id.as_str()).collect();
        assert_eq!(ids, ["d", "n", "a", "e"]);
        assert_eq!(
            statuses(&results),
            [
                ChangeStatus::Changed,
                ChangeStatus::Ok,
                ChangeStatus::Changed,
                ChangeStatus::Changed
            ]
        );
    }

    #[test]
    fn test_panicking_handler_only_fails_its_group() {
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![
            Box::new(PanickingHandler(ChangeType::Delete)),
            Box::new(RecordingHandler::new(&[ChangeType::Add])),
        ];
        let changes = vec![change("a", ChangeType::Add), change("d", ChangeType::Delete)];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default())
            .execute(&handlers)
            .unwrap();

        assert_eq!(statuses(&results), [ChangeStatus::Changed, ChangeStatus::Failed]);
        assert!(results[1].errors()[0].message.contains("apply must not be called"));
    }

    #[test]
    fn test_missing_outcome_is_a_failure() {
        struct ForgetfulHandler;

        impl ChangeHandler<TestChange> for ForgetfulHandler {
            fn supported_change_types(&self) -> &[ChangeType] {
                &[ChangeType::Add]
            }

            fn apply(&self, changes: &[TestChange]) -> Vec<ChangeResponse> {
                changes
                    .iter()
                    .take(1)
                    .map(|c| ChangeResponse::new(c, ChangeMetadata::empty()))
                    .collect()
            }

            fn describe(&self, change: &TestChange) -> String {
                change.id.clone()
            }
        }

        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![Box::new(ForgetfulHandler)];
        let changes = vec![change("a", ChangeType::Add), change("b", ChangeType::Add)];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default())
            .execute(&handlers)
            .unwrap();

        assert_eq!(statuses(&results), [ChangeStatus::Changed, ChangeStatus::Failed]);
        assert!(results[1].errors()[0].message.contains("no outcome"));
    }

    #[test]
    fn test_same_id_changes_keep_their_own_outcome() {
        /// Fails every change after the first one it sees
        struct FirstWinsHandler;

        impl ChangeHandler<TestChange> for FirstWinsHandler {
            fn supported_change_types(&self) -> &[ChangeType] {
                &[ChangeType::Add]
            }

            fn apply(&self, changes: &[TestChange]) -> Vec<ChangeResponse> {
                changes
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        let result = if i == 0 {
                            Ok(())
                        } else {
                            Err(anyhow::anyhow!("{} already written", c.id))
                        };
                        ChangeResponse::new(c, ChangeMetadata::from_result(result))
                    })
                    .collect()
            }

            fn describe(&self, change: &TestChange) -> String {
                change.id.clone()
            }
        }

        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![Box::new(FirstWinsHandler)];
        let changes = vec![change("a", ChangeType::Add), change("a", ChangeType::Add)];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default())
            .execute(&handlers)
            .unwrap();

        assert_eq!(statuses(&results), [ChangeStatus::Changed, ChangeStatus::Failed]);
        assert!(results[0].errors().is_empty());
        assert_eq!(results[1].errors().len(), 1);
        assert_eq!(results[1].errors()[0].message, "a already written");
    }

    #[test]
    fn test_out_of_order_responses_match_by_id() {
        struct ReversingHandler;

        impl ChangeHandler<TestChange> for ReversingHandler {
            fn supported_change_types(&self) -> &[ChangeType] {
                &[ChangeType::Update]
            }

            fn apply(&self, changes: &[TestChange]) -> Vec<ChangeResponse> {
                changes
                    .iter()
                    .rev()
                    .map(|c| {
                        let result = if c.id == "b" {
                            Err(anyhow::anyhow!("cannot apply b"))
                        } else {
                            Ok(())
                        };
                        ChangeResponse::new(c, ChangeMetadata::from_result(result))
                    })
                    .collect()
            }

            fn describe(&self, change: &TestChange) -> String {
                change.id.clone()
            }
        }

        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![Box::new(ReversingHandler)];
        let changes = vec![
            change("a", ChangeType::Update),
            change("b", ChangeType::Update),
            change("c", ChangeType::Update),
            change("d", ChangeType::Update),
        ];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default())
            .execute(&handlers)
            .unwrap();

        assert_eq!(
            statuses(&results),
            [
                ChangeStatus::Changed,
                ChangeStatus::Failed,
                ChangeStatus::Changed,
                ChangeStatus::Changed
            ]
        );
    }

    #[test]
    fn test_groups_run_concurrently() {
        struct RendezvousHandler {
            change_type: ChangeType,
            entered: Arc<AtomicUsize>,
            met: Arc<AtomicBool>,
        }

        impl ChangeHandler<TestChange> for RendezvousHandler {
            fn supported_change_types(&self) -> &[ChangeType] {
                std::slice::from_ref(&self.change_type)
            }

            fn apply(&self, changes: &[TestChange]) -> Vec<ChangeResponse> {
                self.entered.fetch_add(1, Ordering::SeqCst);
                let deadline = Instant::now() + Duration::from_secs(5);
                while self.entered.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(1));
                }
                if self.entered.load(Ordering::SeqCst) >= 2 {
                    self.met.store(true, Ordering::SeqCst);
                }
                changes
                    .iter()
                    .map(|c| ChangeResponse::new(c, ChangeMetadata::empty()))
                    .collect()
            }

            fn describe(&self, change: &TestChange) -> String {
                change.id.clone()
            }
        }

        let entered = Arc::new(AtomicUsize::new(0));
        let met = Arc::new(AtomicBool::new(false));
        let handler = |change_type| RendezvousHandler {
            change_type,
            entered: Arc::clone(&entered),
            met: Arc::clone(&met),
        };
        let handlers: Vec<Box<dyn ChangeHandler<TestChange>>> = vec![
            Box::new(handler(ChangeType::Add)),
            Box::new(handler(ChangeType::Delete)),
        ];
        let changes = vec![change("a", ChangeType::Add), change("d", ChangeType::Delete)];

        let results = ChangeExecutor::new(changes, ExecutorOptions::default().with_jobs(2))
            .execute(&handlers)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(met.load(Ordering::SeqCst), "handler groups did not overlap");
    }
}
