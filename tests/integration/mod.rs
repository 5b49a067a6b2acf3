mod basic_integration;
mod remote_sync;
