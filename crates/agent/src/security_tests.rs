// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    plain = { "alice" },
    with_digits = { "alice42" },
    with_separators = { "a.b_c-d" },
    max_length = { "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" },
)]
fn valid_usernames(name: &str) {
    assert_eq!(parse_user(name).as_deref(), Ok(name));
}

#[yare::parameterized(
    empty = { "" },
    leading_dash = { "-alice" },
    slash = { "a/b" },
    space = { "a b" },
    newline = { "a\nb" },
    non_ascii = { "ali\u{e7}e" },
    too_long = { "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" },
)]
fn invalid_usernames(name: &str) {
    assert_eq!(parse_user(name).map(|_| ()), Err(AgentError::BadArg));
}

#[test]
fn current_username_resolves() {
    assert!(current_username().is_ok());
}
