pub mod overlay_view;
