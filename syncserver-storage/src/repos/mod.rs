//! Per-table repositories over a borrowed connection.

mod file_index;
mod invitations;
mod locks;
mod master_version;
mod members;
mod sharing_groups;
mod uploads;
mod users;

pub use file_index::FileIndexRepository;
pub use invitations::InvitationRepository;
pub use locks::LockRepository;
pub use master_version::MasterVersionRepository;
pub use members::MemberRepository;
pub use sharing_groups::SharingGroupRepository;
pub use uploads::UploadRepository;
pub use users::UserRepository;

use rusqlite::Connection;

/// Entry point to every repository, bound to one connection or transaction.
#[derive(Clone, Copy)]
pub struct Repositories<'c> {
    conn: &'c Connection,
}

impl<'c> Repositories<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn master_versions(&self) -> MasterVersionRepository<'c> {
        MasterVersionRepository::new(self.conn)
    }

    pub fn locks(&self) -> LockRepository<'c> {
        LockRepository::new(self.conn)
    }

    pub fn uploads(&self) -> UploadRepository<'c> {
        UploadRepository::new(self.conn)
    }

    pub fn file_index(&self) -> FileIndexRepository<'c> {
        FileIndexRepository::new(self.conn)
    }

    pub fn sharing_groups(&self) -> SharingGroupRepository<'c> {
        SharingGroupRepository::new(self.conn)
    }

    pub fn members(&self) -> MemberRepository<'c> {
        MemberRepository::new(self.conn)
    }

    pub fn invitations(&self) -> InvitationRepository<'c> {
        InvitationRepository::new(self.conn)
    }

    pub fn users(&self) -> UserRepository<'c> {
        UserRepository::new(self.conn)
    }
}
