pub mod app_name;
pub mod backup;
pub mod delete;
pub mod download;
pub mod maint;
pub mod pmlist;
pub mod restore;
pub mod s3list;
pub mod space;
