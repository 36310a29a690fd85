pub mod map_tiles;
