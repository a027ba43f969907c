//! `TransactionCommand` (§4.7): lets a client hold a transaction open
//! across several separate commands instead of each command committing
//! on its own. A `Begin` while one is already open pushes a savepoint
//! (§4.3) rather than erroring, so nested `Begin`/`Commit`/`Rollback`
//! triples compose.

use super::{HandlerContext, Response};
use crate::retrieval::ResourcePeer;
use crate::session::Session;
use crate::{HandlerError, PimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCommand {
	Begin,
	Commit,
	Rollback,
}

pub async fn handle<P: ResourcePeer>(
	cmd: TransactionCommand,
	session: &mut Session,
	ctx: &HandlerContext<P>,
) -> Result<Response, PimError> {
	if !session.is_authenticated() {
		return Err(HandlerError::validation("not authenticated").into());
	}

	match cmd {
		TransactionCommand::Begin => {
			match session.open_txn.as_mut() {
				Some(txn) => txn.begin_savepoint(),
				None => session.open_txn = Some(ctx.store.begin(session.id).await),
			}
			Ok(Response::Ok)
		}
		TransactionCommand::Commit => {
			let txn = session.open_txn.as_mut().ok_or_else(|| HandlerError::validation("no open transaction"))?;
			if txn.has_open_savepoint() {
				txn.commit_savepoint().map_err(PimError::Store)?;
				return Ok(Response::Ok);
			}
			let txn = session.open_txn.take().expect("checked above");
			let batch = ctx.store.commit(txn).await?;
			ctx.router.dispatch(&batch).await;
			Ok(Response::Ok)
		}
		TransactionCommand::Rollback => {
			let txn = session.open_txn.as_mut().ok_or_else(|| HandlerError::validation("no open transaction"))?;
			if txn.has_open_savepoint() {
				txn.rollback_savepoint().map_err(PimError::Store)?;
				return Ok(Response::Ok);
			}
			let txn = session.open_txn.take().expect("checked above");
			txn.rollback();
			Ok(Response::Ok)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::notify::Router;
	use crate::scheduler::Scheduler;
	use crate::store::Store;
	use crate::types::{EntityId, ResourceId};
	use crate::{RetrievalCoordinator, RetrievalError};
	use async_trait::async_trait;
	use std::sync::Arc;

	struct FailingPeer;
	#[async_trait]
	impl ResourcePeer for FailingPeer {
		async fn retrieve_parts(&self, resource_id: ResourceId, _item_id: EntityId, _part_names: Vec<String>) -> Result<(), RetrievalError> {
			Err(RetrievalError::ResourceFailure { collection_id: 0, resource_id, message: "no peer in tests".to_string() })
		}
	}

	async fn test_context() -> HandlerContext<FailingPeer> {
		let store = Arc::new(Store::open_in_memory(500).unwrap());
		let (_scheduler, _handle, scheduler_control, mut commands) = Scheduler::new(std::time::Duration::from_secs(60));
		tokio::spawn(async move { while commands.recv().await.is_some() {} });
		HandlerContext {
			store,
			router: Router::new(),
			scheduler: scheduler_control,
			retrieval: Arc::new(RetrievalCoordinator::new(Arc::new(FailingPeer))),
			config: Config::default(),
		}
	}

	#[tokio::test]
	async fn begin_without_login_is_rejected() {
		let ctx = test_context().await;
		let mut session = Session::new(1);
		let err = handle(TransactionCommand::Begin, &mut session, &ctx).await.unwrap_err();
		assert!(err.to_string().to_lowercase().contains("authenticat"));
	}

	#[tokio::test]
	async fn commit_without_begin_is_rejected() {
		let ctx = test_context().await;
		let mut session = Session::new(1);
		session.login(crate::session::ClientCapabilities::none());
		let err = handle(TransactionCommand::Commit, &mut session, &ctx).await.unwrap_err();
		assert!(err.to_string().to_lowercase().contains("no open transaction"));
	}

	#[tokio::test]
	async fn begin_commit_closes_the_open_transaction() {
		let ctx = test_context().await;
		let mut session = Session::new(1);
		session.login(crate::session::ClientCapabilities::none());

		handle(TransactionCommand::Begin, &mut session, &ctx).await.unwrap();
		assert!(session.open_txn.is_some());

		handle(TransactionCommand::Commit, &mut session, &ctx).await.unwrap();
		assert!(session.open_txn.is_none());
	}

	#[tokio::test]
	async fn nested_begin_pushes_a_savepoint_that_rollback_unwinds_without_closing_the_transaction() {
		let ctx = test_context().await;
		let mut session = Session::new(1);
		session.login(crate::session::ClientCapabilities::none());

		handle(TransactionCommand::Begin, &mut session, &ctx).await.unwrap();
		handle(TransactionCommand::Begin, &mut session, &ctx).await.unwrap();
		handle(TransactionCommand::Rollback, &mut session, &ctx).await.unwrap();

		assert!(session.open_txn.is_some());

		handle(TransactionCommand::Rollback, &mut session, &ctx).await.unwrap();
		assert!(session.open_txn.is_none());
	}
}

// vim: ts=4
