// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Generally useful functions.

pub fn bytes_to_human_mb(s: u64) -> String {
    use thousands::Separable;
    let mut s = (s / 1_000_000).separate_with_commas();
    s.push_str(" MB");
    s
}
