pub mod factory;
pub mod write_session;
pub mod read_session;
pub mod column;

pub use factory::{Collection, SessionFactory};
pub use write_session::WriteSession;
pub use read_session::{ReadSession, ReadSessionFactory, ScoredDocument};
pub use column::{ColumnReader, TermMatch};
