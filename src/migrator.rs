use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_processed_events_table::Migration),
            Box::new(m20250301_000002_create_marketplace_transactions_table::Migration),
            Box::new(m20250301_000003_create_order_details_table::Migration),
            Box::new(m20250301_000004_create_custom_card_orders_table::Migration),
            Box::new(m20250301_000005_create_customer_purchase_log_table::Migration),
            Box::new(m20250301_000006_create_profiles_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250301_000001_create_processed_events_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_processed_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProcessedEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProcessedEvents::EventId)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProcessedEvents::EventType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProcessedEvents::CorrelationId).string().null())
                        .col(
                            ColumnDef::new(ProcessedEvents::ReceivedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProcessedEvents::ProcessedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_processed_events_type")
                        .table(ProcessedEvents::Table)
                        .col(ProcessedEvents::EventType)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProcessedEvents::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum ProcessedEvents {
        Table,
        EventId,
        EventType,
        CorrelationId,
        ReceivedAt,
        ProcessedAt,
    }
}

mod m20250301_000002_create_marketplace_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_marketplace_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MarketplaceTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MarketplaceTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::ListingId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MarketplaceTransactions::BuyerId).uuid().null())
                        .col(
                            ColumnDef::new(MarketplaceTransactions::SellerId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::AmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::Currency)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::PaymentIntent)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::SessionId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MarketplaceTransactions::CreditedAt)
                                .timestamp()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_marketplace_transactions_session")
                        .table(MarketplaceTransactions::Table)
                        .col(MarketplaceTransactions::SessionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_marketplace_transactions_seller")
                        .table(MarketplaceTransactions::Table)
                        .col(MarketplaceTransactions::SellerId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(MarketplaceTransactions::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(Iden)]
    enum MarketplaceTransactions {
        Table,
        Id,
        ListingId,
        BuyerId,
        SellerId,
        AmountCents,
        Currency,
        PaymentIntent,
        SessionId,
        Status,
        CreatedAt,
        CreditedAt,
    }
}

mod m20250301_000003_create_order_details_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_order_details_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDetails::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::SessionId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(OrderDetails::PaymentIntent).string().null())
                        .col(ColumnDef::new(OrderDetails::CustomerEmail).string().null())
                        .col(
                            ColumnDef::new(OrderDetails::AmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::Currency).string().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::Quantity)
                                .big_integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(OrderDetails::ProductId).string().null())
                        .col(ColumnDef::new(OrderDetails::Shipping).text().null())
                        .col(ColumnDef::new(OrderDetails::Metadata).text().not_null())
                        .col(ColumnDef::new(OrderDetails::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderDetails::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum OrderDetails {
        Table,
        Id,
        SessionId,
        PaymentIntent,
        CustomerEmail,
        AmountCents,
        Currency,
        Quantity,
        ProductId,
        Shipping,
        Metadata,
        CreatedAt,
    }
}

mod m20250301_000004_create_custom_card_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_custom_card_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CustomCardOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomCardOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomCardOrders::SessionId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomCardOrders::CardId).string().not_null())
                        .col(ColumnDef::new(CustomCardOrders::CardName).string().null())
                        .col(
                            ColumnDef::new(CustomCardOrders::Quantity)
                                .big_integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(CustomCardOrders::AmountCents)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CustomCardOrders::Status)
                                .string()
                                .not_null()
                                .default("received"),
                        )
                        .col(
                            ColumnDef::new(CustomCardOrders::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_custom_card_orders_session")
                        .table(CustomCardOrders::Table)
                        .col(CustomCardOrders::SessionId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomCardOrders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CustomCardOrders {
        Table,
        Id,
        SessionId,
        CardId,
        CardName,
        Quantity,
        AmountCents,
        Status,
        CreatedAt,
    }
}

mod m20250301_000005_create_customer_purchase_log_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000005_create_customer_purchase_log_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CustomerPurchaseLog::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerPurchaseLog::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerPurchaseLog::SessionId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerPurchaseLog::CustomerId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(CustomerPurchaseLog::Email).string().null())
                        .col(
                            ColumnDef::new(CustomerPurchaseLog::AmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerPurchaseLog::Quantity)
                                .big_integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(CustomerPurchaseLog::Kind).string().not_null())
                        .col(
                            ColumnDef::new(CustomerPurchaseLog::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomerPurchaseLog::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CustomerPurchaseLog {
        Table,
        Id,
        SessionId,
        CustomerId,
        Email,
        AmountCents,
        Quantity,
        Kind,
        CreatedAt,
    }
}

mod m20250301_000006_create_profiles_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000006_create_profiles_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Profiles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Profiles::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Profiles::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Profiles::DisplayName).string().null())
                        .col(ColumnDef::new(Profiles::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Profiles::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Profiles {
        Table,
        Id,
        Email,
        CreatedAt,
        DisplayName,
    }
}
