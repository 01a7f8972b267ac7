pub mod cloud_examples;
