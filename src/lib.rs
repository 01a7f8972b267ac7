#[allow(non_snake_case)]
pub mod Cloud;
#[allow(non_snake_case)]
pub mod Examples;
#[allow(non_snake_case)]
pub mod Mesh;
#[allow(non_snake_case)]
pub mod Models;
#[allow(non_snake_case)]
pub mod Particles;
#[allow(non_snake_case)]
pub mod Statistics;
