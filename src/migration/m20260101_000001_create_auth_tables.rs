//! Migration: users, roles, registration, OpenID associations and API keys.

use sea_orm_migration::prelude::*;

use super::{nullable_reference, owned_by, timestamp_column, uuid_column, uuid_primary_key};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Users::Id))
                    .col(
                        ColumnDef::new(Users::Username)
                            .string_len(30)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string().null())
                    .col(ColumnDef::new(Users::FirstName).string_len(30).not_null())
                    .col(ColumnDef::new(Users::LastName).string_len(30).not_null())
                    .col(ColumnDef::new(Users::IsActive).boolean().not_null())
                    .col(ColumnDef::new(Users::IsSuperuser).boolean().not_null())
                    .col(timestamp_column(Users::DateJoined))
                    .col(
                        ColumnDef::new(Users::LastLogin)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Users::PasswordResetHash).string().null())
                    .col(
                        ColumnDef::new(Users::PasswordResetAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Legacy rows may carry an empty email, so uniqueness is checked in
        // the forms rather than by a unique index.
        manager
            .create_index(
                Index::create()
                    .name("idx_users_email")
                    .table(Users::Table)
                    .col(Users::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Roles::Id))
                    .col(ColumnDef::new(Roles::Name).string_len(80).not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolePermissions::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(RolePermissions::Id))
                    .col(uuid_column(RolePermissions::RoleId))
                    .col(ColumnDef::new(RolePermissions::Codename).string_len(100).not_null())
                    .foreign_key(&mut owned_by(
                        RolePermissions::Table,
                        RolePermissions::RoleId,
                        Roles::Table,
                        Roles::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_role_permissions_unique")
                    .table(RolePermissions::Table)
                    .col(RolePermissions::RoleId)
                    .col(RolePermissions::Codename)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserRoles::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(UserRoles::Id))
                    .col(uuid_column(UserRoles::UserId))
                    .col(uuid_column(UserRoles::RoleId))
                    .foreign_key(&mut owned_by(
                        UserRoles::Table,
                        UserRoles::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut owned_by(
                        UserRoles::Table,
                        UserRoles::RoleId,
                        Roles::Table,
                        Roles::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_roles_unique")
                    .table(UserRoles::Table)
                    .col(UserRoles::UserId)
                    .col(UserRoles::RoleId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RegistrationProfiles::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(RegistrationProfiles::Id))
                    .col(uuid_column(RegistrationProfiles::UserId).unique_key())
                    .col(
                        ColumnDef::new(RegistrationProfiles::ActivationKey)
                            .string_len(40)
                            .not_null(),
                    )
                    .foreign_key(&mut owned_by(
                        RegistrationProfiles::Table,
                        RegistrationProfiles::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserOpenids::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(UserOpenids::Id))
                    .col(uuid_column(UserOpenids::UserId))
                    .col(
                        ColumnDef::new(UserOpenids::ClaimedId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(UserOpenids::DisplayId).string().not_null())
                    .foreign_key(&mut owned_by(
                        UserOpenids::Table,
                        UserOpenids::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ApiKeys::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(ApiKeys::Id))
                    .col(uuid_column(ApiKeys::OwnerId))
                    .col(
                        ColumnDef::new(ApiKeys::KeyHash)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ApiKeys::KeyPrefix).string_len(8).not_null())
                    .col(ColumnDef::new(ApiKeys::Active).boolean().not_null())
                    .col(ColumnDef::new(ApiKeys::CreatedBy).uuid().null())
                    .col(
                        ColumnDef::new(ApiKeys::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(timestamp_column(ApiKeys::CreatedAt))
                    .col(
                        ColumnDef::new(ApiKeys::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(&mut owned_by(
                        ApiKeys::Table,
                        ApiKeys::OwnerId,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut nullable_reference(
                        ApiKeys::Table,
                        ApiKeys::CreatedBy,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_keys_owner")
                    .table(ApiKeys::Table)
                    .col(ApiKeys::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CorePreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CorePreferences::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CorePreferences::DefaultNewUserRoleId).uuid().null())
                    .foreign_key(&mut nullable_reference(
                        CorePreferences::Table,
                        CorePreferences::DefaultNewUserRoleId,
                        Roles::Table,
                        Roles::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            CorePreferences::Table.into_iden(),
            ApiKeys::Table.into_iden(),
            UserOpenids::Table.into_iden(),
            RegistrationProfiles::Table.into_iden(),
            UserRoles::Table.into_iden(),
            RolePermissions::Table.into_iden(),
            Roles::Table.into_iden(),
            Users::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    FirstName,
    LastName,
    IsActive,
    IsSuperuser,
    DateJoined,
    LastLogin,
    PasswordResetHash,
    PasswordResetAt,
}

#[derive(DeriveIden)]
pub enum Roles {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum RolePermissions {
    Table,
    Id,
    RoleId,
    Codename,
}

#[derive(DeriveIden)]
enum UserRoles {
    Table,
    Id,
    UserId,
    RoleId,
}

#[derive(DeriveIden)]
enum RegistrationProfiles {
    Table,
    Id,
    UserId,
    ActivationKey,
}

#[derive(DeriveIden)]
enum UserOpenids {
    Table,
    Id,
    UserId,
    ClaimedId,
    DisplayId,
}

#[derive(DeriveIden)]
enum ApiKeys {
    Table,
    Id,
    OwnerId,
    KeyHash,
    KeyPrefix,
    Active,
    CreatedBy,
    LastUsedAt,
    CreatedAt,
    RevokedAt,
}

#[derive(DeriveIden)]
enum CorePreferences {
    Table,
    Id,
    DefaultNewUserRoleId,
}
