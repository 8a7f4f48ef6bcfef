pub mod tracker_worker;
