//! Diesel table definitions for the update-lifecycle engine.
//!
//! Tables: releases, packages, builds, updates, comments, bugs, cves,
//! testcases, users, groups, buildroot_overrides, stacks, plus the
//! association tables for the many-to-many links. Enumerated columns are
//! stored as their short string value (e.g. `"pending"`).

diesel::table! {
    releases (id) {
        id -> Int8,
        name -> Varchar,
        long_name -> Varchar,
        version -> Varchar,
        id_prefix -> Varchar,
        branch -> Varchar,
        dist_tag -> Varchar,
        stable_tag -> Varchar,
        testing_tag -> Varchar,
        candidate_tag -> Varchar,
        pending_signing_tag -> Varchar,
        pending_testing_tag -> Varchar,
        pending_stable_tag -> Varchar,
        override_tag -> Varchar,
        state -> Varchar,
    }
}

diesel::table! {
    packages (id) {
        id -> Int8,
        name -> Varchar,
        requirements -> Nullable<Text>,
        content_type -> Varchar,
        stack_id -> Nullable<Int8>,
    }
}

diesel::table! {
    builds (id) {
        id -> Int8,
        nvr -> Varchar,
        package_id -> Int8,
        release_id -> Nullable<Int8>,
        update_id -> Nullable<Int8>,
        signed -> Bool,
        content_type -> Varchar,
        epoch -> Int4,
        ci_url -> Nullable<Text>,
    }
}

diesel::table! {
    updates (id) {
        id -> Int8,
        title -> Varchar,
        alias -> Varchar,
        autokarma -> Bool,
        stable_karma -> Nullable<Int4>,
        unstable_karma -> Nullable<Int4>,
        requirements -> Nullable<Text>,
        require_bugs -> Bool,
        require_testcases -> Bool,
        notes -> Text,
        update_type -> Varchar,
        status -> Varchar,
        request -> Nullable<Varchar>,
        severity -> Varchar,
        suggest -> Varchar,
        locked -> Bool,
        pushed -> Bool,
        critpath -> Bool,
        close_bugs -> Bool,
        date_submitted -> Timestamptz,
        date_modified -> Nullable<Timestamptz>,
        date_approved -> Nullable<Timestamptz>,
        date_pushed -> Nullable<Timestamptz>,
        date_testing -> Nullable<Timestamptz>,
        date_stable -> Nullable<Timestamptz>,
        date_locked -> Nullable<Timestamptz>,
        release_id -> Int8,
        user_id -> Int8,
        test_gating_status -> Nullable<Varchar>,
        test_gating_summary -> Nullable<Varchar>,
    }
}

diesel::table! {
    comments (id) {
        id -> Int8,
        update_id -> Int8,
        user_id -> Int8,
        karma -> Int4,
        karma_critpath -> Int4,
        text -> Text,
        anonymous -> Bool,
        timestamp -> Timestamptz,
    }
}

diesel::table! {
    comment_bug_assoc (id) {
        id -> Int8,
        comment_id -> Int8,
        bug_id -> Int8,
        karma -> Int4,
    }
}

diesel::table! {
    comment_testcase_assoc (id) {
        id -> Int8,
        comment_id -> Int8,
        testcase_id -> Int8,
        karma -> Int4,
    }
}

diesel::table! {
    testcases (id) {
        id -> Int8,
        name -> Varchar,
        package_id -> Int8,
    }
}

diesel::table! {
    bugs (id) {
        id -> Int8,
        bug_id -> Int4,
        title -> Nullable<Varchar>,
        security -> Bool,
        parent -> Bool,
        url -> Nullable<Text>,
    }
}

diesel::table! {
    cves (id) {
        id -> Int8,
        cve_id -> Varchar,
    }
}

diesel::table! {
    users (id) {
        id -> Int8,
        name -> Varchar,
        email -> Nullable<Varchar>,
    }
}

diesel::table! {
    groups (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    buildroot_overrides (id) {
        id -> Int8,
        build_id -> Int8,
        submitter_id -> Int8,
        notes -> Text,
        submission_date -> Timestamptz,
        expiration_date -> Timestamptz,
        expired_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    stacks (id) {
        id -> Int8,
        name -> Varchar,
        description -> Nullable<Text>,
        requirements -> Nullable<Text>,
    }
}

// Association tables (composite primary keys)

diesel::table! {
    update_bugs (update_id, bug_id) {
        update_id -> Int8,
        bug_id -> Int8,
    }
}

diesel::table! {
    update_cves (update_id, cve_id) {
        update_id -> Int8,
        cve_id -> Int8,
    }
}

diesel::table! {
    bug_cves (bug_id, cve_id) {
        bug_id -> Int8,
        cve_id -> Int8,
    }
}

diesel::table! {
    user_packages (user_id, package_id) {
        user_id -> Int8,
        package_id -> Int8,
    }
}

diesel::table! {
    user_groups (user_id, group_id) {
        user_id -> Int8,
        group_id -> Int8,
    }
}

diesel::table! {
    stack_groups (stack_id, group_id) {
        stack_id -> Int8,
        group_id -> Int8,
    }
}

diesel::table! {
    stack_users (stack_id, user_id) {
        stack_id -> Int8,
        user_id -> Int8,
    }
}

// Foreign key relationships
diesel::joinable!(packages -> stacks (stack_id));
diesel::joinable!(builds -> packages (package_id));
diesel::joinable!(builds -> releases (release_id));
diesel::joinable!(builds -> updates (update_id));
diesel::joinable!(updates -> releases (release_id));
diesel::joinable!(updates -> users (user_id));
diesel::joinable!(comments -> updates (update_id));
diesel::joinable!(comments -> users (user_id));
diesel::joinable!(comment_bug_assoc -> comments (comment_id));
diesel::joinable!(comment_bug_assoc -> bugs (bug_id));
diesel::joinable!(comment_testcase_assoc -> comments (comment_id));
diesel::joinable!(comment_testcase_assoc -> testcases (testcase_id));
diesel::joinable!(testcases -> packages (package_id));
diesel::joinable!(buildroot_overrides -> builds (build_id));
diesel::joinable!(buildroot_overrides -> users (submitter_id));
diesel::joinable!(update_bugs -> updates (update_id));
diesel::joinable!(update_bugs -> bugs (bug_id));
diesel::joinable!(update_cves -> updates (update_id));
diesel::joinable!(update_cves -> cves (cve_id));
diesel::joinable!(bug_cves -> bugs (bug_id));
diesel::joinable!(bug_cves -> cves (cve_id));
diesel::joinable!(user_packages -> users (user_id));
diesel::joinable!(user_packages -> packages (package_id));
diesel::joinable!(user_groups -> users (user_id));
diesel::joinable!(user_groups -> groups (group_id));
diesel::joinable!(stack_groups -> stacks (stack_id));
diesel::joinable!(stack_groups -> groups (group_id));
diesel::joinable!(stack_users -> stacks (stack_id));
diesel::joinable!(stack_users -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    releases,
    packages,
    builds,
    updates,
    comments,
    comment_bug_assoc,
    comment_testcase_assoc,
    testcases,
    bugs,
    cves,
    users,
    groups,
    buildroot_overrides,
    stacks,
    update_bugs,
    update_cves,
    bug_cves,
    user_packages,
    user_groups,
    stack_groups,
    stack_users,
);
