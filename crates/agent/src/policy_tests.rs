// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::PolicyConfig;

fn no_peek() -> Result<Option<u32>, AgentError> {
    Ok(None)
}

fn check(
    kind: RequestKind,
    int_arg: i32,
    privileged: bool,
    policy: &PolicyConfig,
) -> Result<(), AgentError> {
    let ctx = GateContext {
        privileged,
        has_state: false,
        policy,
    };
    verify(kind, int_arg, &ctx, no_peek)
}

#[test]
fn user_set_is_privileged_only() {
    let policy = PolicyConfig::default();
    assert_eq!(check(RequestKind::UserSet, 0, true, &policy), Ok(()));
    assert_eq!(
        check(RequestKind::UserSet, 0, false, &policy),
        Err(AgentError::PolicyDenied)
    );
}

#[yare::parameterized(
    key_generate = { RequestKind::KeyGenerate },
    key_remove = { RequestKind::KeyRemove },
    authenticate = { RequestKind::Authenticate },
    skip = { RequestKind::Skip },
    get_passcode = { RequestKind::GetPasscode },
)]
fn capability_denials_have_privileged_bypass(kind: RequestKind) {
    let mut policy = PolicyConfig::default();
    policy.allow_key_generation = false;
    policy.allow_key_removal = false;
    policy.allow_shell_auth = false;
    policy.allow_skipping = false;
    policy.allow_passcode_print = false;

    assert_eq!(check(kind, 0, false, &policy), Err(AgentError::PolicyDenied));
    assert_eq!(check(kind, 0, true, &policy), Ok(()));

    let open = PolicyConfig::default();
    assert_eq!(check(kind, 0, false, &open), Ok(()));
}

#[test]
fn get_str_guards_key_material_only() {
    let mut policy = PolicyConfig::default();
    policy.allow_key_print = false;

    let key = FieldId::Key.code();
    let counter = FieldId::Counter.code();
    let label = FieldId::Label.code();

    assert_eq!(check(RequestKind::GetStr, key, false, &policy), Err(AgentError::PolicyDenied));
    assert_eq!(
        check(RequestKind::GetStr, counter, false, &policy),
        Err(AgentError::PolicyDenied)
    );
    assert_eq!(check(RequestKind::GetStr, label, false, &policy), Ok(()));
    assert_eq!(check(RequestKind::GetStr, key, true, &policy), Ok(()));
}

#[test]
fn state_new_with_bound_state_must_drop_first() {
    let policy = PolicyConfig::default();
    let ctx = GateContext {
        privileged: false,
        has_state: true,
        policy: &policy,
    };
    assert_eq!(
        verify(RequestKind::StateNew, 0, &ctx, no_peek),
        Err(AgentError::MustDropState)
    );
}

#[test]
fn state_new_without_prior_state_checks_generation() {
    let mut policy = PolicyConfig::default();
    policy.allow_key_generation = false;
    assert_eq!(
        check(RequestKind::StateNew, 0, false, &policy),
        Err(AgentError::PolicyGeneration)
    );
    assert_eq!(check(RequestKind::StateNew, 0, true, &policy), Ok(()));
}

#[test]
fn state_new_with_prior_state_checks_regeneration_and_disabled() {
    let mut policy = PolicyConfig::default();
    policy.allow_key_regeneration = false;
    let ctx = GateContext {
        privileged: false,
        has_state: false,
        policy: &policy,
    };
    assert_eq!(
        verify(RequestKind::StateNew, 0, &ctx, || Ok(Some(0))),
        Err(AgentError::PolicyRegeneration)
    );

    let mut policy = PolicyConfig::default();
    policy.allow_disabling = false;
    let ctx = GateContext {
        privileged: false,
        has_state: false,
        policy: &policy,
    };
    assert_eq!(
        verify(RequestKind::StateNew, 0, &ctx, || Ok(Some(flags::DISABLED))),
        Err(AgentError::PolicyDenied)
    );

    let policy = PolicyConfig::default();
    let ctx = GateContext {
        privileged: false,
        has_state: false,
        policy: &policy,
    };
    assert_eq!(verify(RequestKind::StateNew, 0, &ctx, || Ok(Some(0))), Ok(()));
}

#[test]
fn flag_add_salt_rules_bind_even_root() {
    let mut policy = PolicyConfig::default();
    policy.salt = Allowance::Disallow;
    policy.salt_def = false;

    let mask = flags::SALTED as i32;
    assert_eq!(check(RequestKind::FlagAdd, mask, true, &policy), Err(AgentError::PolicySalt));
    assert_eq!(check(RequestKind::FlagAdd, mask, false, &policy), Err(AgentError::PolicySalt));

    // Clearing a merely-allowed salt passes the gate.
    assert_eq!(check(RequestKind::FlagClear, mask, false, &policy), Ok(()));
}

#[test]
fn flag_clear_enforced_salt_binds_even_root() {
    let mut policy = PolicyConfig::default();
    policy.salt = Allowance::Enforce;

    let mask = flags::SALTED as i32;
    assert_eq!(check(RequestKind::FlagClear, mask, true, &policy), Err(AgentError::PolicySalt));
    assert_eq!(check(RequestKind::FlagAdd, mask, true, &policy), Ok(()));
}

#[yare::parameterized(
    add_disabled = { RequestKind::FlagAdd, flags::DISABLED, AgentError::PolicyDisabled },
    clear_disabled = { RequestKind::FlagClear, flags::DISABLED, AgentError::PolicyDisabled },
)]
fn disabled_flag_is_root_controllable_only(kind: RequestKind, mask: u32, expected: AgentError) {
    let policy = PolicyConfig::default();
    assert!(!policy.allow_disabling);
    assert_eq!(check(kind, mask as i32, false, &policy), Err(expected));
    assert_eq!(check(kind, mask as i32, true, &policy), Ok(()));
}

#[test]
fn show_flag_follows_ternary_policy() {
    let mut policy = PolicyConfig::default();
    policy.show = Allowance::Disallow;
    policy.show_def = false;
    let mask = flags::SHOW as i32;

    assert_eq!(check(RequestKind::FlagAdd, mask, false, &policy), Err(AgentError::PolicyShow));
    assert_eq!(check(RequestKind::FlagClear, mask, false, &policy), Ok(()));
    assert_eq!(check(RequestKind::FlagAdd, mask, true, &policy), Ok(()));

    policy.show = Allowance::Enforce;
    policy.show_def = true;
    assert_eq!(check(RequestKind::FlagClear, mask, false, &policy), Err(AgentError::PolicyShow));
    assert_eq!(check(RequestKind::FlagAdd, mask, false, &policy), Ok(()));
}

#[yare::parameterized(
    state_load = { RequestKind::StateLoad },
    state_store = { RequestKind::StateStore },
    state_drop = { RequestKind::StateDrop },
    get_num = { RequestKind::GetNum },
    get_int = { RequestKind::GetInt },
    get_warnings = { RequestKind::GetWarnings },
    update_latest = { RequestKind::UpdateLatest },
    get_prompt = { RequestKind::GetPrompt },
    flag_get = { RequestKind::FlagGet },
    get_alphabet = { RequestKind::GetAlphabet },
    set_num = { RequestKind::SetNum },
    set_int = { RequestKind::SetInt },
    set_str = { RequestKind::SetStr },
    set_spass = { RequestKind::SetSpass },
    disconnect = { RequestKind::Disconnect },
)]
fn unconditionally_allowed_at_this_layer(kind: RequestKind) {
    // Most restrictive policy possible; these pass the gate regardless.
    let mut policy = PolicyConfig::default();
    policy.allow_key_generation = false;
    policy.allow_key_regeneration = false;
    policy.allow_key_removal = false;
    policy.allow_skipping = false;
    policy.allow_passcode_print = false;
    policy.allow_key_print = false;
    policy.allow_shell_auth = false;

    assert_eq!(check(kind, 0, false, &policy), Ok(()));
}

#[test]
fn init_and_reply_are_not_requests() {
    let policy = PolicyConfig::default();
    assert_eq!(check(RequestKind::Init, 0, false, &policy), Err(AgentError::BadRequest));
    assert_eq!(check(RequestKind::Reply, 0, true, &policy), Err(AgentError::BadRequest));
}
