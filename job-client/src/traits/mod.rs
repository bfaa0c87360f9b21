pub mod job_client;
