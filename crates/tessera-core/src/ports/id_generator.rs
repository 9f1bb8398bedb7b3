//! IdGenerator port.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::TaskId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// ULIDs stamped from the injected clock. Ids generated within the same
/// millisecond still sort in generation order, which is what keeps each lane FIFO.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    generator: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_task_id(&self) -> TaskId {
        let now = SystemTime::from(self.clock.now());
        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        let ulid = generator.generate_from_datetime(now).unwrap_or_else(|_| {
            // random part overflowed within one millisecond
            let millis = self.clock.now().timestamp_millis().max(0) as u64;
            Ulid::from_parts(millis, rand::random())
        });
        TaskId::from(ulid)
    }
}
