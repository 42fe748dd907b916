// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Integration tests against the public API.

mod api {
    mod concurrency;
    mod gc;
    mod properties;
    mod store_retrieve;
}
