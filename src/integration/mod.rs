//! Integration tests that run the server over real TLS connections

mod e2e;
