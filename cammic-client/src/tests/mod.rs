//! Test doubles and end-to-end scenarios for the permission core.


mod orchestrator_tests;
