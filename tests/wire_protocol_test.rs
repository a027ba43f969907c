//! Wire-level coverage (C1) driving `pimd::wire::read_command` and
//! `write_response` over an in-memory byte stream the way `serve.rs`
//! drives them over a real socket.

use tokio::io::{AsyncWriteExt, BufReader};

use pimd::handler::Command;
use pimd::protocol::{FrameReader, FrameWriter, Status};
use pimd::store::LocalFsPayloadStore;
use pimd::wire;

async fn parse_one(input: &str) -> (String, Command) {
	let (client, server) = tokio::io::duplex(4096);
	let (server_read, _server_write) = tokio::io::split(server);
	let mut reader = FrameReader::new(BufReader::new(server_read));
	let mut sink = tokio::io::sink();
	let payload_store = LocalFsPayloadStore::new(std::env::temp_dir().join("pimd-wire-test"));

	let (_client_read, mut client_write) = tokio::io::split(client);
	client_write.write_all(input.as_bytes()).await.unwrap();
	drop(client_write);

	wire::read_command(&mut reader, &mut sink, i64::MAX, &payload_store).await.unwrap()
}

#[tokio::test]
async fn login_parses_declared_capabilities() {
	let (tag, cmd) = parse_one("a1 LOGIN (NOTIFICATIONPROTOCOLV2 STREAMINGAPPEND)\n").await;
	assert_eq!(tag, "a1");
	let Command::Login { capabilities } = cmd else { panic!("expected Login command") };
	assert!(capabilities.notification_protocol_v2);
	assert!(capabilities.streaming_append);
	assert!(!capabilities.server_side_search);
}

#[tokio::test]
async fn logout_and_capability_need_no_arguments() {
	let (_tag, cmd) = parse_one("a2 LOGOUT\n").await;
	assert!(matches!(cmd, Command::Logout));

	let (_tag, cmd) = parse_one("a3 CAPABILITY\n").await;
	assert!(matches!(cmd, Command::Capability));
}

#[tokio::test]
async fn unknown_command_reports_a_protocol_error() {
	let (client, server) = tokio::io::duplex(4096);
	let (server_read, _server_write) = tokio::io::split(server);
	let mut reader = FrameReader::new(BufReader::new(server_read));
	let mut sink = tokio::io::sink();
	let payload_store = LocalFsPayloadStore::new(std::env::temp_dir().join("pimd-wire-test-unknown"));

	let (_client_read, mut client_write) = tokio::io::split(client);
	client_write.write_all(b"a4 NOSUCHCOMMAND\n").await.unwrap();
	drop(client_write);

	let err = wire::read_command(&mut reader, &mut sink, i64::MAX, &payload_store).await.unwrap_err();
	assert!(matches!(err.class(), pimd::ErrorClass::Protocol));
}

#[tokio::test]
async fn write_response_renders_an_id_as_an_untagged_line() {
	let mut writer = FrameWriter::new(Vec::new());
	wire::write_response(&mut writer, &pimd::handler::Response::Id(42)).await.unwrap();
	writer.write_tagged("a1", Status::Ok, "completed").await.unwrap();
	let rendered = String::from_utf8(writer.inner_mut().clone()).unwrap();
	assert!(rendered.contains("42"));
	assert!(rendered.contains("a1 OK completed"));
}

// vim: ts=4
