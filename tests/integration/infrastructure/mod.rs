
pub use fake_server::FakeKvServer;
