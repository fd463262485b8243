#![cfg(test)]

//! Unit-test logging. Delegates to the shared initializer so unit and
//! integration tests honor the same `TEST_LOG` / `RUST_LOG` switches.

pub fn init() {
    client_test_support::test_logging::init();
}
