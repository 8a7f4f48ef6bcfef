pub mod region_tracker;
pub mod surface_source;
pub mod video_surface;
