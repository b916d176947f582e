pub mod formatter;
pub mod jobs;
pub mod listener;
pub mod room_poller;
pub mod scheduler;

mod error;

pub use error::{Error, Result};
pub use formatter::{Draft, Formatter};
pub use listener::{ActivityListener, ListenerSettings, SessionReport};
pub use room_poller::{PollReport, RoomPoller, RoomPollerSettings};
pub use scheduler::{
	Delivery, DeliveryJob, DeliveryTarget, InvocationReport, RecordStore, Scheduler,
	SchedulerSettings, Selection, SelectionReport,
};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
