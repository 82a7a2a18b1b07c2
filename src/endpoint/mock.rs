//! A mock endpoint.

use super::Device;
use crate::mock::MockDevice;

impl Device for MockDevice {
    fn supports_readiness_wait(&self) -> bool {
        self.readiness_wait
    }
}
