//! Server bootstrap and per-connection session loop (§5, §6, §7).
//!
//! Grounded in the teacher's `serve()` accept-and-dispatch shape, lifted
//! from a single stdin/stdout dump protocol to a `tokio::net::TcpListener`
//! accepting many concurrent sessions, each driven by its own task per
//! §5's "per-session single-threaded handler execution".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::error::ErrorClass;
use crate::handler::{self, HandlerContext};
use crate::logging::{error, info, warn};
use crate::notify::{NotificationFilter, Router};
use crate::protocol::{FrameReader, FrameWriter, Status};
use crate::retrieval::{ResourcePeer, RetrievalCoordinator, RetrievalError};
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::store::{LocalFsPayloadStore, Store};
use crate::types::{EntityId, ResourceId, SessionId};
use crate::PimError;
use crate::wire;

/// Stands in for a real resource agent (out of scope: §4.10 names the
/// concrete backend an external collaborator). Every fetch fails, so
/// `FetchItems` against uncached parts surfaces a retrieval error unless
/// the caller set `IGNOREERRORS`.
struct UnconfiguredResourcePeer;

#[async_trait]
impl ResourcePeer for UnconfiguredResourcePeer {
	async fn retrieve_parts(
		&self,
		resource_id: ResourceId,
		_item_id: EntityId,
		_part_names: Vec<String>,
	) -> Result<(), RetrievalError> {
		Err(RetrievalError::ResourceFailure {
			collection_id: 0,
			resource_id,
			message: "no resource peer configured".to_string(),
		})
	}
}

fn next_session_id() -> SessionId {
	static NEXT: AtomicU64 = AtomicU64::new(1);
	NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Boots the store, scheduler, and notification router, then accepts
/// connections until the process is asked to stop.
pub async fn run(config: Config) -> Result<(), PimError> {
	std::fs::create_dir_all(&config.data_dir)?;
	let db_path = config.data_dir.join("pimd.redb");
	let store = Arc::new(Store::open(&db_path, config.stats_bulk_move_threshold)?);

	let payload_store = Arc::new(LocalFsPayloadStore::new(config.data_dir.join("parts")));

	let router = Router::new();

	let minimum_interval = Duration::from_secs(60 * config.minimum_check_interval_minutes.max(0) as u64);
	let (scheduler, mut scheduler_handle, scheduler_control, scheduler_commands) = Scheduler::new(minimum_interval);
	tokio::spawn(scheduler.run(scheduler_commands));
	// `ResourcePeer` only exposes per-item retrieval, not a collection-level
	// resync call, so an expired collection is just logged here; wiring
	// this to an actual resource agent is out of scope (§4.10).
	tokio::spawn(async move {
		while let Some(collection_id) = scheduler_handle.fired_rx.recv().await {
			info!(collection_id, "collection check interval expired");
		}
	});

	let retrieval = Arc::new(RetrievalCoordinator::new(Arc::new(UnconfiguredResourcePeer)));

	let ctx = Arc::new(HandlerContext {
		store,
		router,
		scheduler: scheduler_control,
		retrieval,
		config: config.clone(),
	});

	let listener = TcpListener::bind(&config.bind_address).await?;
	info!(address = %config.bind_address, "pimd listening");

	loop {
		let (socket, peer_addr) = listener.accept().await?;
		let ctx = ctx.clone();
		let payload_store = payload_store.clone();
		tokio::spawn(async move {
			let session_id = next_session_id();
			info!(session_id, %peer_addr, "connection accepted");
			if let Err(e) = handle_connection(socket, session_id, ctx.clone(), payload_store).await {
				warn!(session_id, error = %e, "session ended with error");
			}

			// Drop every collection reference and tag-ownership claim this
			// session held (§4.7 ModifyCollection REFERENCED semantics,
			// §3's tag-lifecycle invariant) before unsubscribing it from
			// notifications.
			let mut txn = ctx.store.begin(session_id).await;
			txn.drop_session_references(session_id);
			txn.drop_session_tag_ownership(session_id);
			match ctx.store.commit(txn).await {
				Ok(batch) => ctx.router.dispatch(&batch).await,
				Err(e) => error!(session_id, error = %e, "failed to drop session references on disconnect"),
			}

			ctx.router.unsubscribe(session_id).await;
			info!(session_id, "connection closed");
		});
	}
}

async fn handle_connection(
	socket: TcpStream,
	session_id: SessionId,
	ctx: Arc<HandlerContext<UnconfiguredResourcePeer>>,
	payload_store: Arc<LocalFsPayloadStore>,
) -> Result<(), PimError> {
	socket.set_nodelay(true).ok();
	let (read_half, write_half) = socket.into_split();
	let mut reader = FrameReader::with_timeout(
		BufReader::new(read_half),
		Duration::from_secs(ctx.config.literal_read_timeout_secs),
	);
	let mut writer = FrameWriter::new(write_half);

	let mut session = Session::new(session_id);
	let mut notifications = ctx.router.subscribe(session_id, NotificationFilter::everything()).await;

	writer.write_untagged("PIMD ready").await?;

	loop {
		tokio::select! {
			biased;

			command = wire::read_command(&mut reader, writer.inner_mut(), ctx.config.size_threshold_bytes, payload_store.as_ref()) => {
				let (tag, cmd) = match command {
					Ok(parsed) => parsed,
					Err(e) => {
						if matches!(e.class(), ErrorClass::Protocol) {
							let _ = writer.write_tagged("*", Status::Bad, &e.wire_message()).await;
							return Err(e);
						}
						let _ = writer.write_tagged("*", Status::No, &e.wire_message()).await;
						continue;
					}
				};

				let is_logout = matches!(cmd, handler::Command::Logout);

				match handler::execute(cmd, &mut session, &ctx).await {
					Ok(response) => {
						wire::write_response(&mut writer, &response).await?;
						writer.write_tagged(&tag, Status::Ok, "completed").await?;
						if is_logout {
							return Ok(());
						}
					}
					Err(e) => {
						match e.class() {
							ErrorClass::Protocol => {
								let _ = writer.write_tagged(&tag, Status::Bad, &e.wire_message()).await;
								return Err(e);
							}
							ErrorClass::Logic => {
								error!(session_id, error = %e, "internal error");
								writer.write_tagged(&tag, Status::Bad, &e.wire_message()).await?;
							}
							ErrorClass::Recoverable | ErrorClass::TransactionAborting => {
								writer.write_tagged(&tag, Status::No, &e.wire_message()).await?;
							}
						}
					}
				}
			}

			record = notifications.recv() => {
				match record {
					Some(record) => wire::write_notification(&mut writer, &record).await?,
					None => return Ok(()),
				}
			}
		}
	}
}


// vim: ts=4
