//! `athanor-api` — the HTTP surface: auth, resource routes, the live
//! event stream and process startup.

pub mod app;
pub mod auth;
pub mod middleware;
