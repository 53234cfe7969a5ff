diesel::table! {
    marketplace_items (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Text,
        category -> Varchar,
        product_type -> Varchar,
        price -> Numeric,
        currency -> Varchar,
        payment_type -> Varchar,
        featured -> Bool,
        image_url -> Nullable<Text>,
        demo_url -> Nullable<Text>,
        download_url -> Nullable<Text>,
        technologies -> Jsonb,
        features -> Jsonb,
        included_items -> Jsonb,
        version -> Varchar,
        status -> Varchar,
        licenses -> Int4,
        download_limit -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        subject -> Text,
        body -> Text,
        is_read -> Bool,
        deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    support_packages (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        price -> Numeric,
        currency -> Varchar,
        billing_cycle -> Varchar,
        tier -> Varchar,
        monthly_tickets -> Nullable<Int4>,
        response_hours -> Int4,
        support_channels -> Jsonb,
        priority_support -> Bool,
        dedicated_manager -> Bool,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    package_subscriptions (id) {
        id -> Uuid,
        user_id -> Uuid,
        package_id -> Uuid,
        status -> Varchar,
        started_at -> Timestamptz,
        cancel_requested_at -> Nullable<Timestamptz>,
        cancel_effective_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    support_tickets (id) {
        id -> Uuid,
        user_id -> Uuid,
        subject -> Text,
        category -> Varchar,
        priority -> Varchar,
        message -> Text,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_responses (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author -> Varchar,
        message -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    customers (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        customer_id -> Uuid,
        amount -> Numeric,
        currency -> Varchar,
        status -> Varchar,
        payment_method -> Varchar,
        description -> Text,
        invoice_url -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    settings_sections (section) {
        section -> Varchar,
        data -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(ticket_responses -> support_tickets (ticket_id));
diesel::joinable!(package_subscriptions -> support_packages (package_id));
diesel::joinable!(payments -> customers (customer_id));

diesel::allow_tables_to_appear_in_same_query!(
    marketplace_items,
    messages,
    support_packages,
    package_subscriptions,
    support_tickets,
    ticket_responses,
    customers,
    payments,
    settings_sections,
);
