//! Conversation reconstruction from parent pointers.
//!
//! A chain is walked from a given execution towards its root, one store
//! read per step. [`ChainWalk`] is the lazy cursor; [`ChainResolver`] builds
//! bounded histories and full audit chains on top of it.

use std::collections::HashSet;
use std::sync::Arc;

use ac_domain::error::{Error, Result};
use ac_domain::execution::{Execution, ExecutionId};
use ac_domain::message::Message;
use ac_store::ExecutionStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChainWalk
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cursor over an execution and its ancestors, newest first.
///
/// Each call to [`ChainWalk::next`] fetches exactly one record. A node seen
/// twice means the parent pointers loop, which is reported as
/// [`Error::Integrity`] instead of walking forever.
pub struct ChainWalk<'a, S: ?Sized> {
    store: &'a S,
    next: Option<ExecutionId>,
    seen: HashSet<ExecutionId>,
    from: Option<ExecutionId>,
}

impl<'a, S: ExecutionStore + ?Sized> ChainWalk<'a, S> {
    pub fn new(store: &'a S, start: ExecutionId) -> Self {
        Self {
            store,
            next: Some(start),
            seen: HashSet::new(),
            from: None,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Execution>> {
        let Some(id) = self.next.take() else {
            return Ok(None);
        };
        if !self.seen.insert(id) {
            return Err(Error::Integrity {
                execution_id: id,
                message: "parent chain revisits this execution".into(),
            });
        }

        let exec = match (self.store.get(id).await, self.from) {
            (Ok(exec), _) => exec,
            // The starting id is the caller's to get wrong; a missing
            // ancestor is a broken chain.
            (Err(Error::NotFound(_)), Some(child)) => {
                return Err(Error::Integrity {
                    execution_id: child,
                    message: format!("parent execution {id} does not exist"),
                })
            }
            (Err(e), _) => return Err(e),
        };

        self.from = Some(id);
        self.next = exec.parent_execution_id;
        Ok(Some(exec))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChainResolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ChainResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for ChainResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ExecutionStore + ?Sized> ChainResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn walk(&self, start: ExecutionId) -> ChainWalk<'_, S> {
        ChainWalk::new(self.store.as_ref(), start)
    }

    /// Conversation history ending at `execution_id`, oldest first, as
    /// alternating user/assistant messages.
    ///
    /// Every execution on the path with an output contributes one turn;
    /// executions without output (failed or in flight) are skipped and do
    /// not count towards `max_turns`.
    pub async fn history(&self, execution_id: ExecutionId, max_turns: usize) -> Result<Vec<Message>> {
        if max_turns == 0 {
            return Ok(Vec::new());
        }

        let mut turns: Vec<(String, String)> = Vec::new();
        let mut walk = self.walk(execution_id);
        while let Some(exec) = walk.next().await? {
            if let Some(output) = exec.output {
                turns.push((exec.input, output));
                if turns.len() == max_turns {
                    break;
                }
            }
        }

        Ok(turns
            .into_iter()
            .rev()
            .flat_map(|(input, output)| [Message::user(input), Message::assistant(output)])
            .collect())
    }

    /// Every execution from the root down to `execution_id`, inclusive.
    pub async fn chain(&self, execution_id: ExecutionId) -> Result<Vec<Execution>> {
        let mut out = Vec::new();
        let mut walk = self.walk(execution_id);
        while let Some(exec) = walk.next().await? {
            out.push(exec);
        }
        out.reverse();
        Ok(out)
    }

    /// Id of the chain's first execution.
    pub async fn root(&self, execution_id: ExecutionId) -> Result<ExecutionId> {
        let mut root = execution_id;
        let mut walk = self.walk(execution_id);
        while let Some(exec) = walk.next().await? {
            root = exec.id;
        }
        Ok(root)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ac_domain::agent::{AgentDraft, AgentId, UserId};
    use ac_domain::execution::NewExecution;
    use ac_domain::message::Role;
    use ac_store::{AgentDirectory, MemoryStore};
    use std::collections::HashMap;

    /// Builds chains in a [`MemoryStore`]. `None` output leaves the turn
    /// failed.
    async fn build_chain(store: &MemoryStore, turns: &[(&str, Option<&str>)]) -> Vec<ExecutionId> {
        let agent = store.create_agent(1, AgentDraft::new("a", "p")).await.unwrap();
        let mut parent = None;
        let mut ids = Vec::new();
        for (input, output) in turns {
            let id = store
                .create(NewExecution::processing(agent.id, 1, *input, parent))
                .await
                .unwrap();
            let mut exec = store.get(id).await.unwrap();
            match output {
                Some(text) => exec.complete(*text).unwrap(),
                None => exec.fail("upstream").unwrap(),
            }
            store.commit(&exec).await.unwrap();
            parent = Some(id);
            ids.push(id);
        }
        ids
    }

    fn contents(msgs: &[Message]) -> Vec<&str> {
        msgs.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn history_is_oldest_first_and_alternating() {
        let store = Arc::new(MemoryStore::new());
        let ids = build_chain(&store, &[("q1", Some("a1")), ("q2", Some("a2"))]).await;
        let resolver = ChainResolver::new(store);

        let history = resolver.history(ids[1], 3).await.unwrap();
        assert_eq!(contents(&history), vec!["q1", "a1", "q2", "a2"]);
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn history_keeps_only_the_newest_turns() {
        let store = Arc::new(MemoryStore::new());
        let turns: Vec<(String, String)> =
            (1..=5).map(|i| (format!("q{i}"), format!("a{i}"))).collect();
        let borrowed: Vec<(&str, Option<&str>)> = turns
            .iter()
            .map(|(q, a)| (q.as_str(), Some(a.as_str())))
            .collect();
        let ids = build_chain(&store, &borrowed).await;
        let resolver = ChainResolver::new(store);

        let history = resolver.history(ids[4], 3).await.unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(contents(&history), vec!["q3", "a3", "q4", "a4", "q5", "a5"]);

        assert!(resolver.history(ids[4], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_ancestors_are_skipped_but_walked_past() {
        let store = Arc::new(MemoryStore::new());
        let ids = build_chain(
            &store,
            &[("q1", Some("a1")), ("q2", None), ("q3", Some("a3"))],
        )
        .await;
        let resolver = ChainResolver::new(store);

        // The failed turn does not use up the single allowed turn slot.
        let history = resolver.history(ids[2], 2).await.unwrap();
        assert_eq!(contents(&history), vec!["q1", "a1", "q3", "a3"]);
    }

    #[tokio::test]
    async fn chain_and_root() {
        let store = Arc::new(MemoryStore::new());
        let ids = build_chain(&store, &[("q1", Some("a1")), ("q2", None), ("q3", Some("a3"))]).await;
        let resolver = ChainResolver::new(store);

        let chain: Vec<ExecutionId> = resolver.chain(ids[2]).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(chain, ids);
        assert_eq!(resolver.root(ids[2]).await.unwrap(), ids[0]);
        assert_eq!(resolver.root(ids[0]).await.unwrap(), ids[0]);
    }

    #[tokio::test]
    async fn unknown_start_is_not_found() {
        let resolver = ChainResolver::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            resolver.history(99, 3).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn walk_is_lazy() {
        let store = Arc::new(MemoryStore::new());
        let ids = build_chain(&store, &[("q1", Some("a1")), ("q2", Some("a2"))]).await;
        let resolver = ChainResolver::new(store);

        let mut walk = resolver.walk(ids[1]);
        assert_eq!(walk.next().await.unwrap().unwrap().id, ids[1]);
        assert_eq!(walk.next().await.unwrap().unwrap().id, ids[0]);
        assert!(walk.next().await.unwrap().is_none());
        assert!(walk.next().await.unwrap().is_none());
    }

    // ── Corrupted stores ────────────────────────────────────────────

    /// Serves hand-written rows, including ones that violate the forest
    /// shape a real store enforces.
    struct Rows(HashMap<ExecutionId, Execution>);

    impl Rows {
        fn new(links: &[(ExecutionId, Option<ExecutionId>)]) -> Self {
            let rows = links
                .iter()
                .map(|&(id, parent)| {
                    let mut exec = NewExecution::processing(1, 1, format!("q{id}"), parent)
                        .into_execution(id);
                    exec.complete(format!("a{id}")).unwrap();
                    (id, exec)
                })
                .collect();
            Self(rows)
        }
    }

    #[async_trait::async_trait]
    impl ExecutionStore for Rows {
        async fn create(&self, _new: NewExecution) -> Result<ExecutionId> {
            unimplemented!()
        }
        async fn get(&self, id: ExecutionId) -> Result<Execution> {
            self.0
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::not_found("execution", id))
        }
        async fn commit(&self, _execution: &Execution) -> Result<()> {
            unimplemented!()
        }
        async fn children(&self, _parent_id: ExecutionId) -> Result<Vec<Execution>> {
            unimplemented!()
        }
        async fn list_for_agent(&self, _a: AgentId, _u: UserId) -> Result<Vec<Execution>> {
            unimplemented!()
        }
        async fn delete_for_agent(&self, _a: AgentId) -> Result<u64> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn cycle_is_an_integrity_fault() {
        let resolver = ChainResolver::new(Arc::new(Rows::new(&[(1, Some(3)), (2, Some(1)), (3, Some(2))])));
        // Large turn budget so the walk would loop without the visited set.
        let err = resolver.history(3, 100).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { execution_id: 3, .. }));
        assert!(matches!(resolver.chain(1).await.unwrap_err(), Error::Integrity { .. }));
    }

    #[tokio::test]
    async fn dangling_parent_is_an_integrity_fault() {
        let resolver = ChainResolver::new(Arc::new(Rows::new(&[(2, Some(1))])));
        let err = resolver.chain(2).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { execution_id: 2, .. }));
    }
}
