pub mod recording_repo;
